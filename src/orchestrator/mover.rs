//! Mover collaborator: the narrow seam the `move` pipeline step delegates
//! the actual filesystem relocation to. Nothing in this crate touches a
//! file beyond the scan step's stat/hash/read and the extractors' read-only
//! previews — physically moving bytes around (rsync, reflink, whatever the
//! deployment prefers) is an external concern, supplied by the caller as an
//! implementation of this trait. `run_move` skips with a warning, not an
//! error, when none is configured; the rsync script from the report step
//! remains the supported way to actually relocate files.

use async_trait::async_trait;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub path: String,
    pub moved: bool,
    pub error: Option<String>,
}

/// A collaborator capable of relocating one file from `source` to
/// `destination`.
#[async_trait]
pub trait Mover: Send + Sync {
    async fn move_file(&self, source: &Path, destination: &Path) -> MoveOutcome;
}
