//! Shared data types for the classification/relocation pipeline.

pub mod category_path;
pub mod classification_record;
pub mod file_node;
pub mod folder_action;
pub mod path_models;

pub use category_path::CategoryPath;
pub use classification_record::{ClassificationRecord, ClassificationRecordBuilder};
pub use file_node::{FileNode, FileNodeBuilder, FolderRef};
pub use folder_action::{FolderAction, RequiresAI};
pub use path_models::{ClassifiedPath, FullPath, PathLayer};
