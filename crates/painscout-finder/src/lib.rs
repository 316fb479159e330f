//! Pain-signal discovery pipeline.
//!
//! Turns a free-text topic into a ranked list of social posts whose authors
//! appear to be struggling with it: derive keywords, fan out search angles to
//! a web-search-augmented model, deduplicate, score every candidate lexically,
//! and optionally sample and classify replies for the shortlist.

pub mod audience;
pub mod deep;
pub mod error;
pub mod gateway;
pub mod keywords;
pub mod parser;
pub mod pipeline;
pub mod scorer;
pub mod search;
pub mod types;

pub use audience::{AudienceRegistry, CUSTOM_AUDIENCE};
pub use deep::DeepSettings;
pub use error::{FinderError, ParseError};
pub use gateway::{ModelGateway, ServiceKind};
pub use keywords::{KeywordSet, KeywordSource};
pub use pipeline::{Finder, FinderSettings};
pub use scorer::Lexicon;
pub use search::SearchOutcome;
pub use types::{
    Author, Classification, ClassifiedSample, FinderInput, FinderResult, FinderStats, PainSignal,
    ScoredThread, ThreadCandidate, ThreadMetrics, DEFAULT_MIN_REPLIES,
};
