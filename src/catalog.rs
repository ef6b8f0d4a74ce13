//! Catalog store (C10): the persistent tabular backbone of the pipeline.
//!
//! Three tables — `files`, `folder_hashes`, `folder_actions` — opened once
//! behind a single `Mutex<Connection>` (SQLite's own locking serializes
//! writers regardless; the mutex just keeps this process's callers from
//! interleaving statements on the one connection). WAL mode is mandatory,
//! not an optimization: it is what lets a report-generation read run
//! concurrently with a classification batch write.

use crate::error::CatalogError;
use crate::models::category_path::CategoryPath;
use crate::models::classification_record::ClassificationRecord;
use crate::models::folder_action::FolderAction;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Scanned,
    Planned,
    Moved,
    Error,
}

impl FileStatus {
    fn as_str(self) -> &'static str {
        match self {
            FileStatus::Scanned => "scanned",
            FileStatus::Planned => "planned",
            FileStatus::Moved => "moved",
            FileStatus::Error => "error",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "planned" => FileStatus::Planned,
            "moved" => FileStatus::Moved,
            "error" => FileStatus::Error,
            _ => FileStatus::Scanned,
        }
    }
}

/// One row to insert during a scan, before classification has run.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: String,
    pub size: u64,
    pub mtime: i64,
    pub mime: String,
    pub content_hash: String,
}

/// A row pulled back by `select_unclassified`.
#[derive(Debug, Clone)]
pub struct UnclassifiedFile {
    pub path: String,
    pub mime: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct PlannedFile {
    pub path: String,
    pub destination: String,
    pub size: u64,
    pub content_hash: String,
}

#[derive(Debug, Clone)]
pub struct FileReportRow {
    pub path: String,
    pub size: u64,
    pub mime: String,
    pub content_hash: String,
    pub category: Option<String>,
    pub rule_category: Option<String>,
    pub ai_category: Option<String>,
    pub destination: Option<String>,
    pub status: String,
    pub note: Option<String>,
    pub metadata_json: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FolderHashRow {
    pub folder_path: String,
    pub folder_hash: String,
    pub file_count: u64,
    pub byte_size: u64,
}

/// One group of folders sharing a content hash, as seen by the
/// duplicate-folders report.
#[derive(Debug, Clone)]
pub struct DuplicateFolderGroup {
    pub folder_hash: String,
    pub total_bytes: u64,
    pub paths: Vec<String>,
}

pub struct Catalog {
    conn: Mutex<Connection>,
}

impl Catalog {
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        let catalog = Self { conn: Mutex::new(conn) };
        catalog.migrate()?;
        Ok(catalog)
    }

    pub fn open_in_memory() -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory()?;
        let catalog = Self { conn: Mutex::new(conn) };
        catalog.migrate()?;
        Ok(catalog)
    }

    fn migrate(&self) -> Result<(), CatalogError> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                path TEXT PRIMARY KEY,
                size INTEGER NOT NULL,
                mtime INTEGER NOT NULL,
                mime TEXT NOT NULL,
                hash TEXT,
                category TEXT,
                rule_category TEXT,
                ai_category TEXT,
                metadata_json TEXT,
                preview TEXT,
                file_json TEXT,
                dest TEXT,
                status TEXT NOT NULL DEFAULT 'scanned',
                note TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_files_hash ON files(hash);
            CREATE INDEX IF NOT EXISTS idx_files_size ON files(size);

            CREATE TABLE IF NOT EXISTS folder_hashes (
                folder_path TEXT PRIMARY KEY,
                folder_hash TEXT NOT NULL,
                file_count INTEGER NOT NULL,
                byte_size INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_folder_hashes_hash ON folder_hashes(folder_hash);

            CREATE TABLE IF NOT EXISTS folder_actions (
                folder_path TEXT PRIMARY KEY,
                action TEXT NOT NULL,
                decision_source TEXT NOT NULL,
                decided_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_folder_actions_path ON folder_actions(folder_path);
            "#,
        )?;
        self.ensure_column(&conn, "files", "note", "TEXT")?;
        Ok(())
    }

    /// `ALTER TABLE ... ADD COLUMN`, guarded by a `PRAGMA table_info` check
    /// so re-running migrate() across crate versions never fails on an
    /// already-added column.
    fn ensure_column(&self, conn: &Connection, table: &str, column: &str, decl: &str) -> Result<(), CatalogError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let exists = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .filter_map(Result::ok)
            .any(|name| name == column);
        if !exists {
            conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"), [])?;
        }
        Ok(())
    }

    /// Inserts scanned rows with `INSERT OR IGNORE` semantics (path is
    /// unique); returns the number of rows that were actually new.
    pub fn bulk_insert(&self, rows: &[ScannedFile]) -> Result<usize, CatalogError> {
        let mut conn = self.conn.lock().expect("catalog mutex poisoned");
        let tx = conn.transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO files (path, size, mtime, mime, hash, status) VALUES (?1, ?2, ?3, ?4, ?5, 'scanned')",
            )?;
            for row in rows {
                inserted += stmt.execute(params![row.path, row.size as i64, row.mtime, row.mime, row.content_hash])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Rows where `category IS NULL AND hash IS NOT NULL AND status='scanned'`,
    /// ordered by path depth then path, excluding descendants of (or paths
    /// equal to) a folder with action `KEEP`.
    pub fn select_unclassified(&self, limit: Option<usize>) -> Result<Vec<UnclassifiedFile>, CatalogError> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let sql = format!(
            r#"
            SELECT f.path, f.mime, f.size
            FROM files f
            WHERE f.category IS NULL
              AND f.hash IS NOT NULL
              AND f.status = 'scanned'
              AND NOT EXISTS (
                  SELECT 1 FROM folder_actions fa
                  WHERE fa.action = 'keep'
                    AND (f.path = fa.folder_path OR f.path LIKE fa.folder_path || '/%')
              )
            ORDER BY LENGTH(f.path) - LENGTH(REPLACE(f.path, '/', '')), f.path
            {}
            "#,
            limit.map(|l| format!("LIMIT {l}")).unwrap_or_default()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(UnclassifiedFile {
                    path: row.get(0)?,
                    mime: row.get(1)?,
                    size: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Updates the seven classification columns for one record, keyed by
    /// `path`, inside the caller-provided transaction-per-batch semantics
    /// (one statement execution per record, all within a single connection
    /// lock so the batch is atomic from SQLite's point of view).
    pub fn update_category_dest(&self, records: &[ClassificationRecord]) -> Result<(), CatalogError> {
        let mut conn = self.conn.lock().expect("catalog mutex poisoned");
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"UPDATE files SET
                    category = ?2, dest = ?3, rule_category = ?4, ai_category = ?5,
                    metadata_json = ?6, preview = ?7, file_json = ?8, status = 'planned'
                   WHERE path = ?1"#,
            )?;
            for record in records {
                let (category, dest, rule_category, ai_category, metadata_json, preview, file_json) =
                    record.as_update_params();
                stmt.execute(params![
                    record.path,
                    category,
                    dest,
                    rule_category,
                    ai_category,
                    metadata_json,
                    preview,
                    file_json
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Marks a single row `error` with a diagnostic note, used when
    /// per-file classification or synthesis fails outright.
    pub fn mark_error(&self, path: &str, note: &str) -> Result<(), CatalogError> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        conn.execute(
            "UPDATE files SET status = 'error', note = ?2 WHERE path = ?1",
            params![path, note],
        )?;
        Ok(())
    }

    pub fn upsert_folder_hashes(&self, rows: &[FolderHashRow]) -> Result<(), CatalogError> {
        let mut conn = self.conn.lock().expect("catalog mutex poisoned");
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"INSERT INTO folder_hashes (folder_path, folder_hash, file_count, byte_size)
                   VALUES (?1, ?2, ?3, ?4)
                   ON CONFLICT(folder_path) DO UPDATE SET
                     folder_hash = excluded.folder_hash,
                     file_count = excluded.file_count,
                     byte_size = excluded.byte_size"#,
            )?;
            for row in rows {
                stmt.execute(params![row.folder_path, row.folder_hash, row.file_count as i64, row.byte_size as i64])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Groups `folder_hashes` by hash, returning only groups with more than
    /// one path (duplicate folder trees).
    pub fn select_duplicate_folders(&self) -> Result<Vec<(String, Vec<String>)>, CatalogError> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let mut stmt = conn.prepare(
            r#"SELECT folder_hash, GROUP_CONCAT(folder_path, char(31))
               FROM folder_hashes
               GROUP BY folder_hash
               HAVING COUNT(*) > 1"#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                let hash: String = row.get(0)?;
                let joined: String = row.get(1)?;
                Ok((hash, joined.split('\u{1f}').map(str::to_string).collect::<Vec<_>>()))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Same grouping as [`Catalog::select_duplicate_folders`] but with each
    /// group's total byte footprint, for the duplicate-folders report.
    pub fn select_duplicate_folders_detailed(&self) -> Result<Vec<DuplicateFolderGroup>, CatalogError> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let mut stmt = conn.prepare(
            r#"SELECT folder_hash, SUM(byte_size), GROUP_CONCAT(folder_path, char(31))
               FROM folder_hashes
               GROUP BY folder_hash
               HAVING COUNT(*) > 1"#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                let folder_hash: String = row.get(0)?;
                let total_bytes: i64 = row.get(1)?;
                let joined: String = row.get(2)?;
                Ok(DuplicateFolderGroup {
                    folder_hash,
                    total_bytes: total_bytes as u64,
                    paths: joined.split('\u{1f}').map(str::to_string).collect(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Upserts newly decided folder actions with `decided_at = now` (unix
    /// seconds).
    pub fn save_folder_actions(&self, actions: &HashMap<PathBuf, (FolderAction, String)>) -> Result<(), CatalogError> {
        let mut conn = self.conn.lock().expect("catalog mutex poisoned");
        let now = chrono::Utc::now().timestamp();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"INSERT INTO folder_actions (folder_path, action, decision_source, decided_at)
                   VALUES (?1, ?2, ?3, ?4)
                   ON CONFLICT(folder_path) DO UPDATE SET
                     action = excluded.action,
                     decision_source = excluded.decision_source,
                     decided_at = excluded.decided_at"#,
            )?;
            for (path, (action, source)) in actions {
                stmt.execute(params![path.to_string_lossy(), action.as_str(), source, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Reads back all persisted folder actions as a map, for merging with
    /// freshly-decided ones before a batch's path synthesis pass.
    pub fn get_folder_actions(&self) -> Result<HashMap<PathBuf, FolderAction>, CatalogError> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let mut stmt = conn.prepare("SELECT folder_path, action FROM folder_actions")?;
        let rows = stmt
            .query_map([], |row| {
                let path: String = row.get(0)?;
                let action: String = row.get(1)?;
                Ok((path, action))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(path, action)| {
                action.parse::<FolderAction>().ok().map(|a| (PathBuf::from(path), a))
            })
            .collect();
        Ok(rows)
    }

    /// Rows with a non-null `dest` and `status='scanned'` (i.e. planned but
    /// not yet moved), for report/copy-plan generation.
    pub fn select_planned_moves(&self) -> Result<Vec<PlannedFile>, CatalogError> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let mut stmt = conn.prepare(
            r#"SELECT path, dest, size, hash FROM files
               WHERE dest IS NOT NULL AND status IN ('scanned', 'planned') AND hash IS NOT NULL"#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(PlannedFile {
                    path: row.get(0)?,
                    destination: row.get(1)?,
                    size: row.get::<_, i64>(2)? as u64,
                    content_hash: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Streams every row for the cleanup report.
    pub fn iter_all(&self) -> Result<Vec<FileReportRow>, CatalogError> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let mut stmt = conn.prepare(
            r#"SELECT path, size, mime, hash, category, rule_category, ai_category, dest, status, note, metadata_json
               FROM files ORDER BY path"#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(FileReportRow {
                    path: row.get(0)?,
                    size: row.get::<_, i64>(1)? as u64,
                    mime: row.get(2)?,
                    content_hash: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    category: row.get(4)?,
                    rule_category: row.get(5)?,
                    ai_category: row.get(6)?,
                    destination: row.get(7)?,
                    status: row.get(8)?,
                    note: row.get(9)?,
                    metadata_json: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Streams `(path, hash, size)` for every scanned file with a non-null
    /// hash, consumed by the folder-hash builder without materializing the
    /// whole `files` table into a second in-memory copy.
    pub fn iter_all_files_for_folder_hashing(&self) -> Result<Vec<(String, String, u64)>, CatalogError> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let mut stmt = conn.prepare("SELECT path, hash, size FROM files WHERE hash IS NOT NULL")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_all_files(&self) -> Result<u64, CatalogError> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Marks a row's status after an external mover reports success.
    pub fn mark_moved(&self, path: &str) -> Result<(), CatalogError> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        conn.execute("UPDATE files SET status = 'moved' WHERE path = ?1", params![path])?;
        Ok(())
    }

    pub fn status_of(&self, path: &str) -> Result<Option<FileStatus>, CatalogError> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let raw: Option<String> = conn
            .query_row("SELECT status FROM files WHERE path = ?1", params![path], |row| row.get(0))
            .optional()?;
        Ok(raw.map(|s| FileStatus::parse(&s)))
    }

    #[cfg(test)]
    pub fn category_of(&self, path: &str) -> Result<Option<CategoryPath>, CatalogError> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let raw: Option<String> = conn
            .query_row("SELECT category FROM files WHERE path = ?1", params![path], |row| row.get(0))
            .optional()?;
        Ok(raw.and_then(|s| CategoryPath::parse(&s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(path: &str) -> ScannedFile {
        ScannedFile {
            path: path.to_string(),
            size: 100,
            mtime: 0,
            mime: "text/plain".to_string(),
            content_hash: "deadbeef".to_string(),
        }
    }

    #[test]
    fn bulk_insert_ignores_duplicates() {
        let catalog = Catalog::open_in_memory().unwrap();
        let inserted = catalog.bulk_insert(&[sample_row("/a/b.txt")]).unwrap();
        assert_eq!(inserted, 1);
        let inserted_again = catalog.bulk_insert(&[sample_row("/a/b.txt")]).unwrap();
        assert_eq!(inserted_again, 0);
    }

    #[test]
    fn select_unclassified_excludes_descendants_of_keep_folder() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .bulk_insert(&[sample_row("/a/kept/file.txt"), sample_row("/a/other/file.txt")])
            .unwrap();
        let mut actions = HashMap::new();
        actions.insert(PathBuf::from("/a/kept"), (FolderAction::Keep, "test".to_string()));
        catalog.save_folder_actions(&actions).unwrap();

        let unclassified = catalog.select_unclassified(None).unwrap();
        let paths: Vec<_> = unclassified.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/a/other/file.txt"]);
    }

    #[test]
    fn select_unclassified_orders_by_depth_then_path() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .bulk_insert(&[sample_row("/a/b/c/deep.txt"), sample_row("/a/shallow.txt")])
            .unwrap();
        let unclassified = catalog.select_unclassified(None).unwrap();
        assert_eq!(unclassified[0].path, "/a/shallow.txt");
        assert_eq!(unclassified[1].path, "/a/b/c/deep.txt");
    }

    #[test]
    fn select_duplicate_folders_groups_by_hash() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .upsert_folder_hashes(&[
                FolderHashRow { folder_path: "/r1/Proj".into(), folder_hash: "h1".into(), file_count: 2, byte_size: 10 },
                FolderHashRow { folder_path: "/r2/Proj".into(), folder_hash: "h1".into(), file_count: 2, byte_size: 10 },
                FolderHashRow { folder_path: "/r3/Other".into(), folder_hash: "h2".into(), file_count: 1, byte_size: 5 },
            ])
            .unwrap();
        let groups = catalog.select_duplicate_folders().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "h1");
        let mut paths = groups[0].1.clone();
        paths.sort();
        assert_eq!(paths, vec!["/r1/Proj".to_string(), "/r2/Proj".to_string()]);
    }

    #[test]
    fn select_duplicate_folders_detailed_sums_byte_size() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .upsert_folder_hashes(&[
                FolderHashRow { folder_path: "/r1/Proj".into(), folder_hash: "h1".into(), file_count: 2, byte_size: 10 },
                FolderHashRow { folder_path: "/r2/Proj".into(), folder_hash: "h1".into(), file_count: 2, byte_size: 10 },
            ])
            .unwrap();
        let groups = catalog.select_duplicate_folders_detailed().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].total_bytes, 20);
    }

    #[test]
    fn folder_actions_round_trip() {
        let catalog = Catalog::open_in_memory().unwrap();
        let mut actions = HashMap::new();
        actions.insert(PathBuf::from("/a/b"), (FolderAction::Disaggregate, "rules:decision".to_string()));
        catalog.save_folder_actions(&actions).unwrap();
        let read_back = catalog.get_folder_actions().unwrap();
        assert_eq!(read_back.get(&PathBuf::from("/a/b")), Some(&FolderAction::Disaggregate));
    }
}
