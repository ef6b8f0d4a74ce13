//! Scan step: walks the configured source roots with a thread pool, stats
//! and MIME-detects each file, content-hashes it in 1 MiB chunks, and
//! batch-inserts the results into the catalog. A second pass then builds
//! one folder-hash row per ancestor directory touched by any scanned file.

use crate::catalog::{Catalog, FolderHashRow, ScannedFile};
use crate::config::AppConfig;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

const HASH_CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanSummary {
    pub files_found: u64,
    pub files_inserted: u64,
    pub folders_hashed: u64,
}

/// Walks every configured source root in parallel (one `jwalk` walk per
/// root, each internally thread-pooled) and inserts the resulting rows into
/// the catalog in `db_batch_size` chunks, then builds folder hashes.
pub fn run_scan(cfg: &AppConfig, catalog: &Catalog) -> std::io::Result<ScanSummary> {
    let mut summary = ScanSummary::default();
    let mut batch: Vec<ScannedFile> = Vec::with_capacity(cfg.db_batch_size);

    for root in &cfg.sources {
        let walker = jwalk::WalkDir::new(root).parallelism(jwalk::Parallelism::RayonNewPool(cfg.scan_workers.max(1)));
        for entry in walker {
            let Ok(entry) = entry else { continue };
            if entry.file_type().is_dir() {
                continue;
            }
            let path = entry.path();
            let Some(row) = stat_and_hash(&path) else { continue };
            summary.files_found += 1;
            batch.push(row);
            if batch.len() >= cfg.db_batch_size {
                summary.files_inserted += catalog.bulk_insert(&batch).map_err(to_io_error)? as u64;
                batch.clear();
            }
        }
    }
    if !batch.is_empty() {
        summary.files_inserted += catalog.bulk_insert(&batch).map_err(to_io_error)? as u64;
    }

    summary.folders_hashed = build_folder_hashes(catalog)?;
    Ok(summary)
}

fn stat_and_hash(path: &Path) -> Option<ScannedFile> {
    let metadata = std::fs::metadata(path).ok()?;
    if !metadata.is_file() {
        return None;
    }
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let mime = mime_guess::from_path(path).first_or_octet_stream().to_string();
    let content_hash = hash_file(path).ok()?;

    Some(ScannedFile {
        path: path.to_string_lossy().to_string(),
        size: metadata.len(),
        mtime,
        mime,
        content_hash,
    })
}

/// Hashes a file's content in 1 MiB chunks so large files never need to be
/// fully resident in memory.
fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Every ancestor directory of every scanned file accumulates
/// `relative_path -> content_hash` pairs (relative to that ancestor); each
/// folder's lines are sorted lexicographically by relative path and hashed
/// together, matching the persistent catalog's `FolderHashRecord` shape.
fn build_folder_hashes(catalog: &Catalog) -> std::io::Result<u64> {
    let files = catalog.iter_all_files_for_folder_hashing().map_err(to_io_error)?;

    let mut folders: BTreeMap<PathBuf, Vec<(String, String)>> = BTreeMap::new();
    let mut byte_totals: BTreeMap<PathBuf, u64> = BTreeMap::new();

    for (path, hash, size) in &files {
        let path_buf = PathBuf::from(path);
        let mut cur = path_buf.parent().map(Path::to_path_buf);
        while let Some(folder) = cur {
            let rel = path_buf
                .strip_prefix(&folder)
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|_| path.clone());
            folders.entry(folder.clone()).or_default().push((rel, hash.clone()));
            *byte_totals.entry(folder.clone()).or_insert(0) += size;
            cur = folder.parent().map(Path::to_path_buf);
        }
    }

    let rows: Vec<FolderHashRow> = folders
        .into_iter()
        .map(|(folder, mut entries)| {
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let listing: String = entries.iter().map(|(rel, hash)| format!("{rel}\t{hash}\n")).collect();
            let mut hasher = Sha256::new();
            hasher.update(listing.as_bytes());
            let folder_hash = hex::encode(hasher.finalize());
            let byte_size = *byte_totals.get(&folder).unwrap_or(&0);
            FolderHashRow {
                folder_path: folder.to_string_lossy().to_string(),
                folder_hash,
                file_count: entries.len() as u64,
                byte_size,
            }
        })
        .collect();

    let count = rows.len() as u64;
    catalog.upsert_folder_hashes(&rows).map_err(to_io_error)?;
    Ok(count)
}

fn to_io_error(err: crate::error::CatalogError) -> std::io::Error {
    std::io::Error::other(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_file_is_stable_across_calls() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        write!(file, "hello world").unwrap();
        let a = hash_file(file.path()).unwrap();
        let b = hash_file(file.path()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn build_folder_hashes_assigns_equal_hash_to_identical_listings() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .bulk_insert(&[
                crate::catalog::ScannedFile {
                    path: "/r1/Proj/a.txt".into(),
                    size: 3,
                    mtime: 0,
                    mime: "text/plain".into(),
                    content_hash: "h1".into(),
                },
                crate::catalog::ScannedFile {
                    path: "/r2/Proj/a.txt".into(),
                    size: 3,
                    mtime: 0,
                    mime: "text/plain".into(),
                    content_hash: "h1".into(),
                },
            ])
            .unwrap();
        build_folder_hashes(&catalog).unwrap();
        let groups = catalog.select_duplicate_folders().unwrap();
        assert_eq!(groups.len(), 1);
    }
}
