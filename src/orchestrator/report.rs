//! Report step (C6): renders the catalog's current state into the three
//! artifacts a relocation run hands back to an operator — a pipe-separated
//! cleanup report, a duplicate-folders report, and an executable rsync shell
//! script batching the planned moves.

use crate::catalog::{Catalog, DuplicateFolderGroup, FileReportRow, PlannedFile};
use crate::config::AppConfig;
use crate::models::folder_action::FolderAction;
use crate::resolver::relativize;
use regex::Regex;
use std::path::{Path, PathBuf};

/// `rsync` batches are capped at whichever limit is hit first, so no single
/// shell invocation ever spans an unreasonable amount of data or argv size.
const RSYNC_BATCH_MAX_BYTES: u64 = 5 * 1024 * 1024 * 1024;
const RSYNC_BATCH_MAX_FILES: usize = 200;

#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub cleanup_report: PathBuf,
    pub duplicate_folders_report: PathBuf,
    pub move_script: PathBuf,
}

/// Renders all three report artifacts into `cfg.report_dir` and returns
/// their paths. Each is a plain rendering function below, kept separate from
/// disk I/O so they can be unit-tested on fixed input.
pub fn run_report(
    cfg: &AppConfig,
    catalog: &Catalog,
    wrapper: Option<&Regex>,
    timestamp: &str,
) -> std::io::Result<ReportPaths> {
    std::fs::create_dir_all(&cfg.report_dir)?;

    let rows = catalog.iter_all().map_err(to_io_error)?;
    let cleanup_report = cfg.report_dir.join(format!("cleanup_report_{timestamp}.txt"));
    std::fs::write(&cleanup_report, build_cleanup_report(&rows))?;

    let groups = catalog.select_duplicate_folders_detailed().map_err(to_io_error)?;
    let duplicate_folders_report = cfg.report_dir.join(format!("duplicate_folders_{timestamp}.txt"));
    std::fs::write(&duplicate_folders_report, build_duplicate_folders_report(&groups))?;

    let planned = catalog.select_planned_moves().map_err(to_io_error)?;
    let folder_actions = catalog.get_folder_actions().map_err(to_io_error)?;
    let kept_folders = kept_folder_copies(cfg, &folder_actions, wrapper);
    let move_script = cfg.report_dir.join(format!("move_plan_{timestamp}.sh"));
    std::fs::write(&move_script, build_move_script(&kept_folders, &planned))?;
    set_executable(&move_script)?;

    Ok(ReportPaths { cleanup_report, duplicate_folders_report, move_script })
}

/// Top-level `KEEP` folders (those whose nearest decided ancestor isn't
/// itself `KEEP`, so a folder already covered by its parent's directory
/// copy isn't copied a second time), paired with the destination their
/// structure mirrors to under `main_target`.
fn kept_folder_copies(
    cfg: &AppConfig,
    folder_actions: &std::collections::HashMap<PathBuf, FolderAction>,
    wrapper: Option<&Regex>,
) -> Vec<(String, String)> {
    let mut kept: Vec<&PathBuf> = folder_actions
        .iter()
        .filter(|(_, action)| **action == FolderAction::Keep)
        .map(|(path, _)| path)
        .collect();
    kept.sort();

    kept.into_iter()
        .filter(|folder| !kept_has_ancestor(folder, folder_actions))
        .map(|folder| {
            let rel = relativize(folder, &cfg.sources, wrapper);
            let dest = cfg.main_target.join(rel.trim_start_matches('/'));
            (folder.to_string_lossy().to_string(), dest.to_string_lossy().to_string())
        })
        .collect()
}

fn kept_has_ancestor(folder: &Path, folder_actions: &std::collections::HashMap<PathBuf, FolderAction>) -> bool {
    let mut cur = folder.parent();
    while let Some(dir) = cur {
        if folder_actions.get(dir) == Some(&FolderAction::Keep) {
            return true;
        }
        cur = dir.parent();
    }
    false
}

#[cfg(unix)]
fn set_executable(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn set_executable(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}

fn to_io_error(err: crate::error::CatalogError) -> std::io::Error {
    std::io::Error::other(err.to_string())
}

/// One pipe-separated line per catalog row, column order fixed:
/// `path|size|mime|hash|category|rule_category|ai_category|dest|status|note|metadata_json`.
pub fn build_cleanup_report(rows: &[FileReportRow]) -> String {
    let mut out = String::new();
    for row in rows {
        out.push_str(&row.path);
        out.push('|');
        out.push_str(&row.size.to_string());
        out.push('|');
        out.push_str(&row.mime);
        out.push('|');
        out.push_str(&row.content_hash);
        out.push('|');
        out.push_str(row.category.as_deref().unwrap_or(""));
        out.push('|');
        out.push_str(row.rule_category.as_deref().unwrap_or(""));
        out.push('|');
        out.push_str(row.ai_category.as_deref().unwrap_or(""));
        out.push('|');
        out.push_str(row.destination.as_deref().unwrap_or(""));
        out.push('|');
        out.push_str(&row.status);
        out.push('|');
        out.push_str(row.note.as_deref().unwrap_or(""));
        out.push('|');
        out.push_str(row.metadata_json.as_deref().unwrap_or(""));
        out.push('\n');
    }
    out
}

/// One pipe-separated line per duplicate-folder group:
/// `folder_hash|group_size|total_bytes|paths`, with `paths` joined on
/// `\x1f` (the same separator SQLite's `GROUP_CONCAT` already used, so it
/// passes through unchanged).
pub fn build_duplicate_folders_report(groups: &[DuplicateFolderGroup]) -> String {
    let mut out = String::new();
    for group in groups {
        out.push_str(&group.folder_hash);
        out.push('|');
        out.push_str(&group.paths.len().to_string());
        out.push('|');
        out.push_str(&group.total_bytes.to_string());
        out.push('|');
        out.push_str(&group.paths.join("\u{1f}"));
        out.push('\n');
    }
    out
}

/// Groups planned moves into batches bounded by [`RSYNC_BATCH_MAX_BYTES`]
/// and [`RSYNC_BATCH_MAX_FILES`] (whichever fills first starts a new batch).
/// A batch also never spans two source directories: grouping stays stable
/// across `moves`' incoming (catalog) order, but a change of source parent
/// always starts a fresh batch, so every `rsync` invocation pulls from one
/// directory.
fn batch_moves(moves: &[PlannedFile]) -> Vec<Vec<&PlannedFile>> {
    let mut batches: Vec<Vec<&PlannedFile>> = Vec::new();
    let mut current: Vec<&PlannedFile> = Vec::new();
    let mut current_bytes: u64 = 0;
    let mut current_dir: Option<PathBuf> = None;

    for mv in moves {
        let dir = PathBuf::from(&mv.path).parent().map(Path::to_path_buf);
        let would_overflow_bytes = current_bytes + mv.size > RSYNC_BATCH_MAX_BYTES;
        let would_overflow_count = current.len() >= RSYNC_BATCH_MAX_FILES;
        let changed_dir = !current.is_empty() && dir != current_dir;
        if !current.is_empty() && (would_overflow_bytes || would_overflow_count || changed_dir) {
            batches.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current_dir = dir;
        current_bytes += mv.size;
        current.push(mv);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Renders an executable shell script that recreates every planned move's
/// destination directory and copies the file there with `rsync -a
/// --partial --append-verify` (resumable, checksum-verified on completion,
/// safe to re-run if a batch is interrupted partway through).
///
/// `kept_folders` (source, destination) pairs are folders decided `KEEP` in
/// their entirety — each gets one recursive directory copy ahead of the
/// per-file batches, instead of being expanded file by file.
pub fn build_move_script(kept_folders: &[(String, String)], moves: &[PlannedFile]) -> String {
    let mut script = String::from("#!/bin/sh\nset -eu\n\n");

    if !kept_folders.is_empty() {
        script.push_str(&format!("# {} intact folder(s) copied as a unit\n", kept_folders.len()));
        for (src, dest) in kept_folders {
            if let Some(parent) = PathBuf::from(dest).parent() {
                script.push_str(&format!("mkdir -p {}\n", shell_quote(&parent.to_string_lossy())));
            }
            script.push_str(&format!(
                "rsync -a --partial --append-verify {}/ {}/\n",
                shell_quote(src.trim_end_matches('/')),
                shell_quote(dest.trim_end_matches('/'))
            ));
        }
        script.push('\n');
    }

    if moves.is_empty() {
        if kept_folders.is_empty() {
            script.push_str("# nothing to move\n");
        }
        return script;
    }

    let batches = batch_moves(moves);
    for (idx, batch) in batches.iter().enumerate() {
        let batch_bytes: u64 = batch.iter().map(|m| m.size).sum();
        script.push_str(&format!(
            "# batch {} of {}: {} files, {} bytes\n",
            idx + 1,
            batches.len(),
            batch.len(),
            batch_bytes
        ));

        let mut parent_dirs: Vec<String> = batch
            .iter()
            .filter_map(|m| PathBuf::from(&m.destination).parent().map(|p| p.to_string_lossy().to_string()))
            .collect();
        parent_dirs.sort();
        parent_dirs.dedup();
        for dir in &parent_dirs {
            script.push_str(&format!("mkdir -p {}\n", shell_quote(dir)));
        }

        for mv in batch {
            script.push_str(&format!(
                "rsync -a --partial --append-verify {} {}\n",
                shell_quote(&mv.path),
                shell_quote(&mv.destination)
            ));
        }
        script.push('\n');
    }

    script
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_report_renders_exact_column_order() {
        let rows = vec![FileReportRow {
            path: "/a/b.txt".into(),
            size: 10,
            mime: "text/plain".into(),
            content_hash: "deadbeef".into(),
            category: Some("Documents/Misc".into()),
            rule_category: None,
            ai_category: Some("Documents/Misc".into()),
            destination: Some("/target/Documents/Misc/b.txt".into()),
            status: "planned".into(),
            note: None,
            metadata_json: None,
        }];
        let report = build_cleanup_report(&rows);
        assert_eq!(
            report.trim_end(),
            "/a/b.txt|10|text/plain|deadbeef|Documents/Misc||Documents/Misc|/target/Documents/Misc/b.txt|planned||"
        );
    }

    #[test]
    fn duplicate_folders_report_joins_paths_with_unit_separator() {
        let groups = vec![DuplicateFolderGroup {
            folder_hash: "h1".into(),
            total_bytes: 20,
            paths: vec!["/r1/Proj".into(), "/r2/Proj".into()],
        }];
        let report = build_duplicate_folders_report(&groups);
        assert_eq!(report.trim_end(), "h1|2|20|/r1/Proj\u{1f}/r2/Proj");
    }

    #[test]
    fn move_script_splits_batches_on_file_count() {
        let moves: Vec<PlannedFile> = (0..250)
            .map(|i| PlannedFile {
                path: format!("/src/f{i}.txt"),
                destination: format!("/dst/f{i}.txt"),
                size: 1,
                content_hash: "h".into(),
            })
            .collect();
        let script = build_move_script(&[], &moves);
        assert!(script.contains("batch 1 of 2"));
        assert!(script.contains("batch 2 of 2"));
    }

    #[test]
    fn move_script_splits_batches_on_byte_size() {
        let moves = vec![
            PlannedFile { path: "/src/a".into(), destination: "/dst/a".into(), size: RSYNC_BATCH_MAX_BYTES, content_hash: "h".into() },
            PlannedFile { path: "/src/b".into(), destination: "/dst/b".into(), size: 1, content_hash: "h".into() },
        ];
        let script = build_move_script(&[], &moves);
        assert!(script.contains("batch 1 of 2"));
        assert!(script.contains("batch 2 of 2"));
    }

    #[test]
    fn move_script_quotes_paths_with_spaces_and_quotes() {
        let moves = vec![PlannedFile {
            path: "/src/My File's Name.txt".into(),
            destination: "/dst/My File's Name.txt".into(),
            size: 1,
            content_hash: "h".into(),
        }];
        let script = build_move_script(&[], &moves);
        assert!(script.contains("'/src/My File'\\''s Name.txt'"));
    }

    #[test]
    fn empty_move_plan_still_produces_a_valid_script() {
        let script = build_move_script(&[], &[]);
        assert!(script.starts_with("#!/bin/sh"));
        assert!(script.contains("nothing to move"));
    }

    #[test]
    fn kept_folders_get_one_recursive_copy_ahead_of_file_batches() {
        let kept = vec![("/src/Archive".to_string(), "/target/Archive".to_string())];
        let moves = vec![PlannedFile {
            path: "/src/Misc/a.txt".into(),
            destination: "/target/Misc/a.txt".into(),
            size: 1,
            content_hash: "h".into(),
        }];
        let script = build_move_script(&kept, &moves);
        assert!(script.contains("intact folder(s) copied as a unit"));
        let archive_line = script.lines().find(|l| l.contains("'/src/Archive/'")).expect("archive rsync line");
        assert!(archive_line.contains("'/target/Archive/'"));
        assert!(script.find("Archive").unwrap() < script.find("Misc").unwrap());
    }

    #[test]
    fn batches_never_mix_two_source_directories() {
        let moves = vec![
            PlannedFile { path: "/src/a/one.txt".into(), destination: "/dst/a/one.txt".into(), size: 1, content_hash: "h".into() },
            PlannedFile { path: "/src/b/two.txt".into(), destination: "/dst/b/two.txt".into(), size: 1, content_hash: "h".into() },
        ];
        let batches = batch_moves(&moves);
        assert_eq!(batches.len(), 2);
    }
}
