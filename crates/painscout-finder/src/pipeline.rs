use std::sync::Arc;
use std::time::Duration;

use painscout_core::AppConfig;
use painscout_llm::{Backoff, BudgetGovernor, ModelService, FINDER_RUN_COST};
use tracing::Instrument;
use uuid::Uuid;

use crate::audience::AudienceRegistry;
use crate::deep::{apply_outcome, deep_classify, DeepSettings};
use crate::error::FinderError;
use crate::gateway::ModelGateway;
use crate::keywords::derive_keywords;
use crate::scorer::{score_and_rank, Lexicon};
use crate::search::search_candidates;
use crate::types::{FinderInput, FinderResult, FinderStats};

/// Tunables for a [`Finder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinderSettings {
    pub search_timeout: Duration,
    pub classify_timeout: Duration,
    /// Retry policy for transient service errors; every attempt is metered.
    pub retry: Backoff,
    pub deep: DeepSettings,
}

impl Default for FinderSettings {
    fn default() -> Self {
        Self {
            search_timeout: Duration::from_secs(90),
            classify_timeout: Duration::from_secs(30),
            retry: Backoff::default(),
            deep: DeepSettings::default(),
        }
    }
}

impl FinderSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            search_timeout: Duration::from_secs(config.search.timeout_secs),
            classify_timeout: Duration::from_secs(config.classify.timeout_secs),
            retry: Backoff::new(config.max_retries, config.retry_backoff_base_ms),
            deep: DeepSettings::default(),
        }
    }
}

/// The pain-signal finder: topic in, ranked threads out.
pub struct Finder {
    search: Arc<dyn ModelService>,
    classify: Arc<dyn ModelService>,
    governor: Arc<BudgetGovernor>,
    registry: AudienceRegistry,
    lexicon: Lexicon,
    settings: FinderSettings,
}

impl Finder {
    #[must_use]
    pub fn new(
        search: Arc<dyn ModelService>,
        classify: Arc<dyn ModelService>,
        governor: Arc<BudgetGovernor>,
    ) -> Self {
        Self {
            search,
            classify,
            governor,
            registry: AudienceRegistry::builtin(),
            lexicon: Lexicon::english(),
            settings: FinderSettings::default(),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: AudienceRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_lexicon(mut self, lexicon: Lexicon) -> Self {
        self.lexicon = lexicon;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: FinderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Run the whole funnel for one topic.
    ///
    /// Never returns an error: failures are reported through
    /// `FinderResult::success` and `FinderResult::error`.
    pub async fn run(&self, input: &FinderInput) -> FinderResult {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("finder_run", run_id = %run_id, topic = %input.topic.trim());
        self.run_gated(input).instrument(span).await
    }

    async fn run_gated(&self, input: &FinderInput) -> FinderResult {
        if !self.governor.has_finder_budget() {
            let remaining = self.governor.monthly_remaining();
            tracing::warn!(remaining, required = FINDER_RUN_COST, "monthly budget exhausted");
            return FinderResult::failure(
                format!(
                    "Monthly API budget exceeded: {remaining} calls remaining, a run needs about {FINDER_RUN_COST}"
                ),
                self.governor.status(),
            );
        }

        match self.execute(input).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "finder run failed");
                FinderResult::failure(e.to_string(), self.governor.status())
            }
        }
    }

    async fn execute(&self, input: &FinderInput) -> Result<FinderResult, FinderError> {
        let topic = input.topic.trim();
        if topic.is_empty() {
            return Err(FinderError::EmptyTopic);
        }
        let language = input
            .language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty());
        let audience = self
            .registry
            .resolve(input.audience.as_deref(), input.custom_audience.as_ref());

        let gateway = ModelGateway::new(
            Arc::clone(&self.search),
            Arc::clone(&self.classify),
            Arc::clone(&self.governor),
            self.settings.search_timeout,
            self.settings.classify_timeout,
        )
        .with_retry(self.settings.retry);

        tracing::info!(
            audience = input.audience.as_deref().unwrap_or("none"),
            min_replies = input.min_replies,
            deep = input.deep,
            "finder run started"
        );

        let (keywords, search) = tokio::join!(
            derive_keywords(&gateway, topic, language),
            search_candidates(
                &gateway,
                topic,
                language,
                audience.as_ref(),
                input.min_replies
            ),
        );

        let mut threads = score_and_rank(&search.candidates, &keywords, &self.lexicon);
        let mut stats = FinderStats {
            candidates_fetched: search.candidates.len(),
            ..FinderStats::default()
        };

        if input.deep && !threads.is_empty() {
            let outcome =
                deep_classify(&gateway, &threads, topic, language, &self.settings.deep).await;
            apply_outcome(&mut threads, &outcome);
            stats.stage1_scanned = outcome.stage1_scanned;
            stats.stage2_scanned = outcome.stage2_scanned;
        }

        stats.total_api_reads = gateway.reads();

        tracing::info!(
            candidates = stats.candidates_fetched,
            threads = threads.len(),
            reads = stats.total_api_reads,
            keyword_source = ?keywords.source,
            "finder run complete"
        );

        Ok(FinderResult {
            success: true,
            threads,
            query_used: search.angles,
            topic_keywords: keywords.topic_keywords,
            pain_keywords: keywords.pain_keywords,
            stats,
            rate_limit_status: self.governor.status(),
            error: None,
        })
    }
}
