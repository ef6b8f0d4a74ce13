//! Orchestrator (C11): owns the catalog store and the classifier pool, and
//! drives one of `{scan, classify, move, report, all}` end to end.

pub mod classify;
pub mod mover;
pub mod report;
pub mod scan;

use crate::catalog::Catalog;
use crate::categories::Categories;
use crate::classifier::ai::AiAdapter;
use crate::classifier::multiplexer::Multiplexer;
use crate::classifier::rules_classifier::RulesClassifier;
use crate::classifier::Classifier;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::extract::ExtractorRegistry;
use crate::rules::RuleSet;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

pub use classify::ClassifySummary;
pub use mover::{MoveOutcome, Mover};
pub use report::ReportPaths;
pub use scan::ScanSummary;

/// Cooldown the multiplexer holds a worker in after it drops below the
/// rolling success-rate floor, before giving it another chance.
const MULTIPLEXER_FAILURE_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default)]
pub struct MoveSummary {
    pub files_moved: u64,
    pub files_failed: u64,
}

/// Ties the classification/relocation-planning pipeline's components
/// together: the catalog, the compiled category tree and rule table, and
/// whichever classifier pool `CLASSIFIER` selected (rules-only, a single AI
/// endpoint, or several behind a multiplexer).
pub struct Orchestrator {
    cfg: AppConfig,
    catalog: Catalog,
    categories: Categories,
    rules: RuleSet,
    classifier: Arc<dyn Classifier>,
    extractor: ExtractorRegistry,
    wrapper: Option<Regex>,
}

impl Orchestrator {
    pub fn new(cfg: AppConfig) -> Result<Self, AppError> {
        let categories = Categories::from_path(&cfg.categories_path)?;
        let rules = RuleSet::load(&cfg.rules_path, &categories)?;
        let catalog = Catalog::open(&cfg.db_path)?;
        let extractor = ExtractorRegistry::new(cfg.ocr_timeout);
        let wrapper = cfg
            .source_wrapper_regex
            .as_deref()
            .and_then(|pattern| Regex::new(&format!("(?i)^{pattern}$")).ok());
        let classifier = build_classifier(&cfg, &categories)?;

        Ok(Self { cfg, catalog, categories, rules, classifier, extractor, wrapper })
    }

    pub fn run_scan(&self) -> std::io::Result<ScanSummary> {
        scan::run_scan(&self.cfg, &self.catalog)
    }

    pub async fn run_classify(&self) -> Result<ClassifySummary, crate::error::CatalogError> {
        let pipeline = classify::ClassifyPipeline {
            cfg: &self.cfg,
            catalog: &self.catalog,
            categories: &self.categories,
            rules: &self.rules,
            classifier: self.classifier.as_ref(),
            extractor: &self.extractor,
            wrapper: self.wrapper.as_ref(),
        };
        pipeline.run().await
    }

    /// Hands every planned move to `mover`, marking each row `moved` on
    /// success. Skips entirely (with a warning, not an error) when no mover
    /// is configured — physically relocating files is outside this crate's
    /// scope; the generated rsync script from `run_report` is the supported
    /// path for that.
    pub async fn run_move(
        &self,
        mover: Option<&dyn Mover>,
    ) -> Result<MoveSummary, crate::error::CatalogError> {
        let Some(mover) = mover else {
            tracing::warn!("no mover configured; skipping physical relocation (see the generated rsync script)");
            return Ok(MoveSummary::default());
        };

        let mut summary = MoveSummary::default();
        for planned in self.catalog.select_planned_moves()? {
            let outcome = mover
                .move_file(std::path::Path::new(&planned.path), std::path::Path::new(&planned.destination))
                .await;
            if outcome.moved {
                self.catalog.mark_moved(&planned.path)?;
                summary.files_moved += 1;
            } else {
                let note = outcome.error.unwrap_or_else(|| "move failed".to_string());
                self.catalog.mark_error(&planned.path, &note)?;
                summary.files_failed += 1;
            }
        }
        Ok(summary)
    }

    pub fn run_report(&self, timestamp: &str) -> std::io::Result<ReportPaths> {
        report::run_report(&self.cfg, &self.catalog, self.wrapper.as_ref(), timestamp)
    }

    /// Scan, then classify to exhaustion, then render reports. The physical
    /// move step is deliberately excluded from `all` — it always needs an
    /// operator decision (which mover, or run the generated script) that
    /// this crate can't make on its own.
    pub async fn run_all(&self, timestamp: &str) -> Result<(ScanSummary, ClassifySummary, ReportPaths), AppError> {
        let scan_summary = self.run_scan()?;
        let classify_summary = self.run_classify().await?;
        let report_paths = self.run_report(timestamp)?;
        Ok((scan_summary, classify_summary, report_paths))
    }

    pub async fn ensure_classifier_available(&self) -> bool {
        self.classifier.ensure_available().await
    }

    pub fn categories(&self) -> &Categories {
        &self.categories
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

/// Builds the classifier pool named by `cfg.classifier_kind`: `"manual"`
/// wraps the rule table alone, anything else builds one `AiAdapter` per
/// configured endpoint and, when there's more than one, wraps them in a
/// `Multiplexer`.
fn build_classifier(cfg: &AppConfig, categories: &Categories) -> Result<Arc<dyn Classifier>, AppError> {
    if cfg.classifier_kind == "manual" {
        let rules = RuleSet::load(&cfg.rules_path, categories)?;
        return Ok(Arc::new(RulesClassifier::new(rules)));
    }

    let categories = Arc::new(categories.clone());
    let endpoints = cfg.ollama_endpoints()?;
    let adapters: Vec<Arc<dyn Classifier>> = endpoints
        .into_iter()
        .map(|endpoint| {
            Arc::new(AiAdapter::new(
                endpoint,
                Arc::clone(&categories),
                cfg.ai_api_key.clone(),
                cfg.ollama_timeout,
                cfg.ollama_retries,
                cfg.ollama_backoff,
                cfg.ollama_throttle,
            )) as Arc<dyn Classifier>
        })
        .collect();

    if adapters.len() == 1 {
        Ok(adapters.into_iter().next().expect("checked len == 1"))
    } else {
        Ok(Arc::new(Multiplexer::new(adapters, MULTIPLEXER_FAILURE_COOLDOWN)))
    }
}
