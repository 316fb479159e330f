use std::collections::HashSet;

use painscout_llm::CompletionRequest;
use serde::Deserialize;

use crate::error::{FinderError, ParseError};
use crate::gateway::{ModelGateway, ServiceKind};
use crate::parser;

/// Pain words used when the model cannot supply its own.
pub const FALLBACK_PAIN_KEYWORDS: [&str; 8] = [
    "frustrated",
    "struggling",
    "hate",
    "problem",
    "issue",
    "broken",
    "sucks",
    "failing",
];

const MAX_KEYWORDS: usize = 8;
const MAX_FALLBACK_TOPIC_WORDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordSource {
    Model,
    Fallback,
}

/// Lowercased topic and pain vocabulary for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSet {
    pub topic_keywords: Vec<String>,
    pub pain_keywords: Vec<String>,
    pub source: KeywordSource,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeywordResponse {
    #[serde(default)]
    topic_keywords: Vec<String>,
    #[serde(default)]
    pain_keywords: Vec<String>,
}

/// Ask the classification model for topic and pain keywords.
///
/// Never fails: any call or parse problem degrades to [`fallback_keywords`].
pub async fn derive_keywords(
    gateway: &ModelGateway,
    topic: &str,
    language: Option<&str>,
) -> KeywordSet {
    match request_keywords(gateway, topic, language).await {
        Ok(set) => {
            tracing::debug!(
                topic_keywords = set.topic_keywords.len(),
                pain_keywords = set.pain_keywords.len(),
                "derived keywords"
            );
            set
        }
        Err(e) => {
            tracing::warn!(topic, error = %e, "keyword derivation failed, using fallback");
            fallback_keywords(topic)
        }
    }
}

async fn request_keywords(
    gateway: &ModelGateway,
    topic: &str,
    language: Option<&str>,
) -> Result<KeywordSet, FinderError> {
    let request = CompletionRequest::new(keyword_prompt(topic, language))
        .system("You extract search vocabulary. Reply with a single JSON object and nothing else.")
        .max_tokens(400)
        .temperature(0.3);

    let text = gateway.call(ServiceKind::Classify, &request).await?;
    let parsed: KeywordResponse = parser::parse_as(&text, "keywords")?;

    let topic_keywords = clean_keywords(parsed.topic_keywords);
    let pain_keywords = clean_keywords(parsed.pain_keywords);
    if topic_keywords.is_empty() || pain_keywords.is_empty() {
        return Err(ParseError::Empty("keywords").into());
    }

    Ok(KeywordSet {
        topic_keywords,
        pain_keywords,
        source: KeywordSource::Model,
    })
}

fn keyword_prompt(topic: &str, language: Option<&str>) -> String {
    let language_line = language.map_or_else(String::new, |lang| {
        format!("Respond with keywords in {lang}, as people writing in {lang} would phrase them.\n")
    });
    format!(
        "Topic: \"{topic}\"\n\n\
         List the words people use when they post about this topic, and the words they use \
         when they are frustrated or stuck with it.\n\
         - topicKeywords: 6-8 short terms (single words or two-word phrases) that identify the topic\n\
         - painKeywords: 6-8 terms expressing frustration, difficulty or unmet need around it\n\
         {language_line}\n\
         Return exactly: {{\"topicKeywords\": [\"...\"], \"painKeywords\": [\"...\"]}}"
    )
}

/// Keywords derived from the topic text alone.
///
/// Topic words longer than 3 characters (up to 5), or the whole topic when it
/// has none, plus [`FALLBACK_PAIN_KEYWORDS`].
#[must_use]
pub fn fallback_keywords(topic: &str) -> KeywordSet {
    let words = topic
        .split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|word| word.chars().count() > 3)
        .collect::<Vec<_>>();

    let mut topic_keywords = clean_keywords(words);
    topic_keywords.truncate(MAX_FALLBACK_TOPIC_WORDS);
    if topic_keywords.is_empty() {
        let whole = topic.trim().to_lowercase();
        if !whole.is_empty() {
            topic_keywords.push(whole);
        }
    }

    KeywordSet {
        topic_keywords,
        pain_keywords: FALLBACK_PAIN_KEYWORDS.iter().map(ToString::to_string).collect(),
        source: KeywordSource::Fallback,
    }
}

/// Trim, lowercase, drop blanks and duplicates (order preserved), cap at 8.
fn clean_keywords(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty() && seen.insert(k.clone()))
        .take(MAX_KEYWORDS)
        .collect()
}
