//! `ClassificationRecord`: the row shape written back to the catalog after a
//! file has been classified and its destination synthesized.

use super::category_path::CategoryPath;
use super::file_node::{serialize_file_node, FileNode};
use super::path_models::ClassifiedPath;
use crate::config::AppConfig;

#[derive(Debug, Clone)]
pub struct ClassificationRecord {
    pub path: String,
    pub category: Option<CategoryPath>,
    pub destination: Option<String>,
    pub rule_category: Option<CategoryPath>,
    pub ai_category: Option<CategoryPath>,
    pub metadata_json: Option<String>,
    pub preview: Option<String>,
    pub file_json: Option<String>,
}

impl ClassificationRecord {
    pub fn category_label(&self) -> String {
        self.category
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_else(|| CategoryPath::unknown().to_string())
    }

    /// Seven-column tuple matching `catalog::update_category_dest`'s
    /// parameter order (path is bound separately as the `WHERE` key).
    pub fn as_update_params(
        &self,
    ) -> (
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
    ) {
        (
            self.category_label(),
            self.destination.clone(),
            self.rule_category.as_ref().map(|c| c.to_string()),
            self.ai_category.as_ref().map(|c| c.to_string()),
            self.metadata_json.clone(),
            self.preview.clone(),
            self.file_json.clone(),
        )
    }

    pub fn export(&self) -> serde_json::Value {
        serde_json::json!({
            "path": self.path,
            "category": self.category.as_ref().map(|c| c.to_string()),
            "destination": self.destination,
            "rule_category": self.rule_category.as_ref().map(|c| c.to_string()),
            "ai_category": self.ai_category.as_ref().map(|c| c.to_string()),
        })
    }
}

pub struct ClassificationRecordBuilder<'a> {
    cfg: &'a AppConfig,
}

impl<'a> ClassificationRecordBuilder<'a> {
    pub fn new(cfg: &'a AppConfig) -> Self {
        Self { cfg }
    }

    pub fn build(&self, node: &FileNode, destination: &ClassifiedPath) -> ClassificationRecord {
        let preview = node.preview.as_ref().map(|p| {
            p.chars().take(self.cfg.max_content_peek).collect::<String>()
        });
        let metadata_json = if node.metadata.is_empty() {
            None
        } else {
            serde_json::to_string(&node.metadata.to_map()).ok()
        };

        ClassificationRecord {
            path: node.physical_path.to_string_lossy().to_string(),
            category: Some(destination.category.clone()),
            destination: Some(destination.destination().to_string_lossy().to_string()),
            rule_category: node.rule_category.clone(),
            ai_category: node.ai_category.clone(),
            metadata_json,
            preview,
            file_json: serde_json::to_string(&serialize_file_node(node)).ok(),
        }
    }
}
