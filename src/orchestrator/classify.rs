//! Per-file classifier orchestrator (C8): for each unclassified catalog row,
//! decides rules-final vs AI, assembles prompt context, and persists the
//! resulting category/destination. Runs batch-by-batch until the catalog's
//! unclassified selection is exhausted.

use crate::catalog::{Catalog, UnclassifiedFile};
use crate::categories::Categories;
use crate::classifier::{Classifier, ClassifyRequest};
use crate::config::AppConfig;
use crate::extract::ExtractorRegistry;
use crate::metadata::{self, FileMetadata};
use crate::models::category_path::CategoryPath;
use crate::models::classification_record::{ClassificationRecord, ClassificationRecordBuilder};
use crate::models::file_node::{BuildArgs, FileNodeBuilder};
use crate::models::folder_action::FolderAction;
use crate::path_synth::PathSynthesizer;
use crate::resolver::{build_folder_samples, relativize, FolderResolver, ResolverFile};
use crate::rules::RuleSet;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifySummary {
    pub files_classified: u64,
    pub files_errored: u64,
    pub folders_decided: u64,
}

pub struct ClassifyPipeline<'a> {
    pub cfg: &'a AppConfig,
    pub catalog: &'a Catalog,
    pub categories: &'a Categories,
    pub rules: &'a RuleSet,
    pub classifier: &'a dyn Classifier,
    pub extractor: &'a ExtractorRegistry,
    pub wrapper: Option<&'a Regex>,
}

impl<'a> ClassifyPipeline<'a> {
    /// Pulls unclassified batches until the catalog selection is empty,
    /// resolving folder actions once per batch before per-file decisions.
    pub async fn run(&self) -> Result<ClassifySummary, crate::error::CatalogError> {
        let mut summary = ClassifySummary::default();
        loop {
            let batch = self.catalog.select_unclassified(Some(self.cfg.db_batch_size))?;
            if batch.is_empty() {
                break;
            }

            let persisted = self.catalog.get_folder_actions()?;
            let decided = self.resolve_batch_folders(&batch, &persisted).await;
            summary.folders_decided += decided.len() as u64;
            self.catalog.save_folder_actions(&decided)?;

            let mut folder_actions = persisted;
            for (path, (action, _source)) in &decided {
                folder_actions.insert(path.clone(), *action);
            }

            let mut records = Vec::with_capacity(batch.len());
            for file in &batch {
                match self.classify_one(file, &folder_actions).await {
                    Some(record) => records.push(record),
                    None => {
                        self.catalog.mark_error(&file.path, "failed to synthesize destination")?;
                        summary.files_errored += 1;
                    }
                }
            }
            summary.files_classified += records.len() as u64;
            self.catalog.update_category_dest(&records)?;
        }
        Ok(summary)
    }

    async fn resolve_batch_folders(
        &self,
        batch: &[UnclassifiedFile],
        persisted: &HashMap<PathBuf, FolderAction>,
    ) -> HashMap<PathBuf, (FolderAction, String)> {
        let paths: Vec<PathBuf> = batch.iter().map(|f| PathBuf::from(&f.path)).collect();
        let resolver_files: Vec<ResolverFile<'_>> =
            batch.iter().zip(paths.iter()).map(|(f, p)| ResolverFile { path: p, mime: &f.mime }).collect();
        let samples = build_folder_samples(&resolver_files);

        let ai: Option<&dyn Classifier> = if self.classifier.is_ai() { Some(self.classifier) } else { None };
        let resolver =
            FolderResolver { rules: self.rules, ai, sources: &self.cfg.sources, wrapper: self.wrapper };
        resolver.resolve(&samples, persisted).await
    }

    async fn classify_one(
        &self,
        file: &UnclassifiedFile,
        folder_actions: &HashMap<PathBuf, FolderAction>,
    ) -> Option<ClassificationRecord> {
        let path = PathBuf::from(&file.path);
        let rel_path = relativize(&path, &self.cfg.sources, self.wrapper);
        let rule_match = self.rules.match_path(&rel_path, &file.mime);
        let rules_only = !self.classifier.is_ai();
        let metadata = self.collect_metadata(&path, &file.mime, file.size);
        let preview = self.extractor.preview(&path, &file.mime, self.cfg.max_content_peek);

        let is_final = rule_match
            .as_ref()
            .is_some_and(|m| matches!(m.rule.requires_ai, crate::models::folder_action::RequiresAI::Final));

        let (category, rule_category, ai_category, classifier_origin, rule_match_groups) = if is_final || rules_only {
            match rule_match {
                Some(m) => (m.rule.category_path.clone(), Some(m.rule.category_path.clone()), None, "rules".to_string(), m.named_groups),
                None => (CategoryPath::unknown(), None, None, "rules".to_string(), HashMap::new()),
            }
        } else {
            let hint = rule_match.as_ref().map(|m| m.rule.category_path.to_string());
            let request = ClassifyRequest {
                name: path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
                rel_path: rel_path.clone(),
                mime: file.mime.clone(),
                sample: preview.clone(),
                hint,
                metadata: metadata.clone(),
            };
            let response = self.classifier.classify(request).await;
            let rule_category = rule_match.as_ref().map(|m| m.rule.category_path.clone());
            let named_groups = rule_match.map(|m| m.named_groups).unwrap_or_default();
            (response.category.clone(), rule_category, Some(response.category), response.worker, named_groups)
        };

        let builder = FileNodeBuilder::new(&self.cfg.sources, folder_actions, self.wrapper);
        let node = builder.build(
            &path,
            BuildArgs {
                category,
                rule_category,
                ai_category,
                mime: file.mime.clone(),
                metadata,
                rule_match_groups,
                classifier_origin: Some(classifier_origin),
                preview: preview.as_deref(),
            },
        )?;

        let synthesizer = PathSynthesizer::new(self.categories, &self.cfg.strip_dirs, &self.cfg.main_target);
        let destination = synthesizer.synthesize(&node);
        let record_builder = ClassificationRecordBuilder::new(self.cfg);
        Some(record_builder.build(&node, &destination))
    }

    /// Stat metadata plus, where the MIME type qualifies, media tags and
    /// Office document core properties — each layer only fills keys the
    /// previous one left empty.
    fn collect_metadata(&self, path: &std::path::Path, mime: &str, size: u64) -> FileMetadata {
        let mut meta = metadata::collect_stat_metadata(path, size);
        meta.merge(&metadata::collect_media_tags(path, mime));
        meta.merge(&metadata::collect_document_properties(path, mime));
        meta
    }
}
