use chrono::{DateTime, Utc};
use painscout_core::AudienceConfig;
use painscout_llm::BudgetStatus;
use serde::{Deserialize, Serialize};

/// Default minimum reply count a post must declare to be kept.
pub const DEFAULT_MIN_REPLIES: u32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub username: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMetrics {
    /// `None` when the search service did not report a reply count.
    pub replies: Option<u32>,
    pub likes: u32,
    pub shares: u32,
}

impl ThreadMetrics {
    /// Reply count used for scoring; unknown counts score as zero.
    #[must_use]
    pub fn replies_or_zero(&self) -> u32 {
        self.replies.unwrap_or(0)
    }
}

/// A raw post discovered by the search fan-out, before scoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadCandidate {
    /// Platform post id (the numeric status id).
    pub id: String,
    pub url: String,
    pub text: String,
    pub author: Author,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub metrics: ThreadMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Pain,
    Curiosity,
    Objection,
    Fluff,
}

impl Classification {
    /// Lenient parse of a model-emitted label; unknown labels are `None`.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "pain" => Some(Self::Pain),
            "curiosity" | "question" => Some(Self::Curiosity),
            "objection" => Some(Self::Objection),
            "fluff" | "other" | "noise" => Some(Self::Fluff),
            _ => None,
        }
    }
}

/// One sampled reply with its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedSample {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub is_pain: bool,
    pub classification: Classification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_quote: Option<String>,
}

/// Aggregate pain evidence for one thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PainSignal {
    /// Fraction of sampled replies judged as pain, or the lexical pain
    /// strength when no replies were sampled. Always in `[0, 1]`.
    pub density: f64,
    pub pain_count: u32,
    pub sample_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_pain_quote: Option<String>,
    pub matched_keywords: Vec<String>,
}

/// A ranked thread as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredThread {
    #[serde(flatten)]
    pub candidate: ThreadCandidate,
    /// 0–100.
    pub score: u8,
    pub pain_signal: PainSignal,
    pub why_surfaced: String,
}

/// Request envelope for one finder run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinderInput {
    pub topic: String,
    pub language: Option<String>,
    pub min_replies: u32,
    /// Preset name, or `"custom"` to use `custom_audience`.
    pub audience: Option<String>,
    pub custom_audience: Option<AudienceConfig>,
    /// Run the two-stage reply classification on the shortlist.
    pub deep: bool,
}

impl FinderInput {
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            language: None,
            min_replies: DEFAULT_MIN_REPLIES,
            audience: None,
            custom_audience: None,
            deep: false,
        }
    }

    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    #[must_use]
    pub fn min_replies(mut self, min_replies: u32) -> Self {
        self.min_replies = min_replies;
        self
    }

    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    #[must_use]
    pub fn custom_audience(mut self, custom: AudienceConfig) -> Self {
        self.audience = Some(crate::audience::CUSTOM_AUDIENCE.to_string());
        self.custom_audience = Some(custom);
        self
    }

    #[must_use]
    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinderStats {
    pub candidates_fetched: usize,
    pub stage1_scanned: usize,
    pub stage2_scanned: usize,
    pub total_api_reads: u32,
}

/// Response envelope for one finder run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinderResult {
    pub success: bool,
    pub threads: Vec<ScoredThread>,
    pub query_used: Vec<String>,
    pub topic_keywords: Vec<String>,
    pub pain_keywords: Vec<String>,
    pub stats: FinderStats,
    pub rate_limit_status: BudgetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FinderResult {
    /// A failed run: no threads, zeroed stats, and the reason.
    #[must_use]
    pub fn failure(error: impl Into<String>, rate_limit_status: BudgetStatus) -> Self {
        Self {
            success: false,
            threads: Vec::new(),
            query_used: Vec::new(),
            topic_keywords: Vec::new(),
            pain_keywords: Vec::new(),
            stats: FinderStats::default(),
            rate_limit_status,
            error: Some(error.into()),
        }
    }
}
