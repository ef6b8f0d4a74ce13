//! Rules-only `Classifier`: wraps the compiled rule table so the
//! per-file orchestrator can treat "no AI configured" identically to "AI
//! configured" at the call site — only the trait object behind the
//! reference changes.

use super::{Classifier, ClassifyRequest, ClassifyResponse, FolderAdviceRequest, FolderAdviceResponse};
use crate::models::folder_action::FolderAction;
use crate::rules::RuleSet;
use async_trait::async_trait;

pub struct RulesClassifier {
    rules: RuleSet,
}

impl RulesClassifier {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl Classifier for RulesClassifier {
    async fn classify(&self, request: ClassifyRequest) -> ClassifyResponse {
        match self.rules.match_path(&request.rel_path, &request.mime) {
            Some(m) => ClassifyResponse { category: m.rule.category_path.clone(), worker: "rules".to_string(), error: None },
            None => ClassifyResponse::unknown("rules", "no rule matched"),
        }
    }

    async fn advise_folder_action(&self, request: FolderAdviceRequest) -> FolderAdviceResponse {
        FolderAdviceResponse {
            action: request.rule_hint.unwrap_or(FolderAction::Disaggregate),
            worker: "rules".to_string(),
            error: None,
        }
    }

    async fn close(&self) -> Result<(), String> {
        Ok(())
    }

    async fn ensure_available(&self) -> bool {
        !self.rules.has_errors()
    }

    fn display_name(&self) -> &str {
        "rules"
    }

    fn is_ai(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::Categories;
    use std::io::Write;

    fn categories() -> Categories {
        Categories::from_source("Media/Music\n__default__,").unwrap()
    }

    #[tokio::test]
    async fn classify_uses_matched_rule_category() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r"^/Music/.*,audio/.*,Media/Music,keep,final").unwrap();
        let rules = RuleSet::load(file.path(), &categories()).unwrap();
        let classifier = RulesClassifier::new(rules);
        let response = classifier
            .classify(ClassifyRequest {
                name: "song.flac".to_string(),
                rel_path: "/Music/song.flac".to_string(),
                mime: "audio/flac".to_string(),
                sample: None,
                hint: None,
                metadata: crate::metadata::FileMetadata::new(),
            })
            .await;
        assert_eq!(response.category.to_string(), "Media/Music");
        assert!(!classifier.is_ai());
    }

    #[tokio::test]
    async fn classify_falls_back_to_unknown_without_a_match() {
        let rules = RuleSet::load(std::path::Path::new("/nonexistent"), &categories()).unwrap();
        let classifier = RulesClassifier::new(rules);
        let response = classifier
            .classify(ClassifyRequest {
                name: "x".to_string(),
                rel_path: "/x".to_string(),
                mime: "application/octet-stream".to_string(),
                sample: None,
                hint: None,
                metadata: crate::metadata::FileMetadata::new(),
            })
            .await;
        assert!(response.error.is_some());
    }
}
