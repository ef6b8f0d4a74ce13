//! Output shapes of the path synthesizer (`path_synth`): the layered
//! decomposition of a destination path, kept mainly so reports can explain
//! *why* a file landed where it did.

use super::category_path::CategoryPath;
use std::path::{Path, PathBuf};

/// The raw ingredients the synthesizer assembled before rendering a
/// destination string.
#[derive(Debug, Clone)]
pub struct FullPath {
    pub original: PathBuf,
    pub source_prefix: Vec<String>,
    pub disaggregated: Vec<String>,
    pub kept: Vec<String>,
    pub kept_role: &'static str,
    pub file: String,
}

impl FullPath {
    pub fn render(&self) -> String {
        let mut parts = Vec::new();
        if !self.source_prefix.is_empty() {
            parts.push(format!("[source/{}]", self.source_prefix.join("/")));
        }
        if !self.disaggregated.is_empty() {
            parts.push(format!("[disagg/{}]", self.disaggregated.join("/")));
        }
        if !self.kept.is_empty() {
            parts.push(format!("[{}/{}]", self.kept_role, self.kept.join("/")));
        }
        parts.push(self.file.clone());
        parts.join("  ")
    }
}

/// One named layer of a `ClassifiedPath`'s decomposition.
#[derive(Debug, Clone)]
pub struct PathLayer {
    pub role: &'static str,
    pub parts: Vec<String>,
}

impl PathLayer {
    pub fn render(&self) -> String {
        format!("[{}/{}]", self.role, self.parts.join("/"))
    }
}

/// The final output of path synthesis for one file.
#[derive(Debug, Clone)]
pub struct ClassifiedPath {
    pub full_path: FullPath,
    pub destination: PathBuf,
    pub category: CategoryPath,
    pub metadata: std::collections::HashMap<String, String>,
}

impl ClassifiedPath {
    pub fn build(
        destination: PathBuf,
        category: CategoryPath,
        metadata: std::collections::HashMap<String, String>,
        full_path: FullPath,
    ) -> Self {
        Self { full_path, destination, category, metadata }
    }

    pub fn source(&self) -> &Path {
        &self.full_path.original
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn layers(&self) -> Vec<PathLayer> {
        let mut layers = Vec::new();
        if !self.full_path.source_prefix.is_empty() {
            layers.push(PathLayer { role: "source", parts: self.full_path.source_prefix.clone() });
        }
        if !self.full_path.disaggregated.is_empty() {
            layers.push(PathLayer { role: "disagg", parts: self.full_path.disaggregated.clone() });
        }
        layers.push(PathLayer { role: "category", parts: self.category.segments().to_vec() });
        if !self.full_path.kept.is_empty() {
            layers.push(PathLayer {
                role: self.full_path.kept_role,
                parts: self.full_path.kept.clone(),
            });
        }
        layers
    }

    pub fn explanation(&self) -> String {
        let rendered = self.full_path.render();
        let name = self
            .destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        format!("{rendered} -> {name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_include_category_between_disagg_and_kept() {
        let full = FullPath {
            original: PathBuf::from("/src/a/b/file.txt"),
            source_prefix: vec!["src".into()],
            disaggregated: vec!["a".into()],
            kept: vec!["b".into()],
            kept_role: "keep",
            file: "file.txt".into(),
        };
        let cp = ClassifiedPath::build(
            PathBuf::from("/target/Docs/b/file.txt"),
            CategoryPath::parse("Docs").unwrap(),
            Default::default(),
            full,
        );
        let roles: Vec<_> = cp.layers().iter().map(|l| l.role).collect();
        assert_eq!(roles, vec!["source", "disagg", "category", "keep"]);
    }
}
