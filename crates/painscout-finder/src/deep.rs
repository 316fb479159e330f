//! Two-stage reply classification for the quick-scored shortlist.
//!
//! Stage 1 samples a few replies per thread and asks for a cheap pain /
//! not-pain verdict, several threads per call. Stage 2 samples more replies
//! for the densest survivors and classifies each thread on its own with the
//! four-way taxonomy. Reply fetches run concurrently; classification calls
//! run one after another.

use std::collections::HashMap;
use std::fmt::Write as _;

use futures::future::join_all;
use painscout_llm::CompletionRequest;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{FinderError, ParseError};
use crate::gateway::{ModelGateway, ServiceKind};
use crate::parser;
use crate::scorer::{clamp_score, MIN_SCORE};
use crate::types::{Classification, ClassifiedSample, PainSignal, ScoredThread};

const QUOTE_MAX_CHARS: usize = 140;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeepSettings {
    /// Threads sampled in stage 1.
    pub stage1_limit: usize,
    /// Replies fetched per thread in stage 1.
    pub stage1_sample: usize,
    /// Threads per stage-1 classification call.
    pub stage1_batch: usize,
    /// Threads promoted to stage 2.
    pub stage2_limit: usize,
    /// Replies fetched per thread in stage 2.
    pub stage2_sample: usize,
}

impl Default for DeepSettings {
    fn default() -> Self {
        Self {
            stage1_limit: 15,
            stage1_sample: 8,
            stage1_batch: 5,
            stage2_limit: 10,
            stage2_sample: 20,
        }
    }
}

/// Classified reply samples per thread id.
#[derive(Debug, Clone, Default)]
pub struct DeepOutcome {
    pub samples: HashMap<String, Vec<ClassifiedSample>>,
    pub stage1_scanned: usize,
    pub stage2_scanned: usize,
}

#[derive(Debug, Clone)]
struct Reply {
    id: String,
    text: String,
    author: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Verdict {
    key: String,
    #[serde(default)]
    is_pain: Option<bool>,
    #[serde(default)]
    classification: Option<String>,
    #[serde(default)]
    key_quote: Option<String>,
}

struct Stage1Entry {
    index: usize,
    samples: Vec<ClassifiedSample>,
}

impl Stage1Entry {
    fn pain_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_pain).count()
    }

    fn density(&self) -> f64 {
        density(self.pain_count(), self.samples.len())
    }
}

/// Run both stages over `threads` (already ranked best first).
pub async fn deep_classify(
    gateway: &ModelGateway,
    threads: &[ScoredThread],
    topic: &str,
    language: Option<&str>,
    settings: &DeepSettings,
) -> DeepOutcome {
    let shortlist = &threads[..threads.len().min(settings.stage1_limit)];
    if shortlist.is_empty() {
        return DeepOutcome::default();
    }

    // Stage 1: sample, then batch-classify pain / not pain.
    let fetched = join_all(
        shortlist
            .iter()
            .map(|thread| fetch_replies(gateway, thread, settings.stage1_sample, language)),
    )
    .await;
    let sampled: Vec<(usize, Vec<Reply>)> = fetched
        .into_iter()
        .enumerate()
        .filter(|(_, replies)| !replies.is_empty())
        .collect();

    let mut stage1 = Vec::with_capacity(sampled.len());
    for batch in sampled.chunks(settings.stage1_batch.max(1)) {
        match classify_pain(gateway, topic, language, batch).await {
            Ok(mut verdicts) => {
                for (index, replies) in batch {
                    let samples = replies
                        .iter()
                        .enumerate()
                        .map(|(r, reply)| {
                            let verdict = verdicts.remove(&reply_key(*index, r));
                            binary_sample(reply, verdict)
                        })
                        .collect();
                    stage1.push(Stage1Entry {
                        index: *index,
                        samples,
                    });
                }
            }
            Err(e) => {
                tracing::warn!(threads = batch.len(), error = %e, "stage 1 classification batch failed");
            }
        }
    }

    stage1.sort_by(|a, b| b.density().total_cmp(&a.density()));
    let stage1_scanned = stage1.len();
    tracing::info!(
        sampled = sampled.len(),
        classified = stage1_scanned,
        "deep stage 1 complete"
    );

    let mut samples: HashMap<String, Vec<ClassifiedSample>> = stage1
        .iter()
        .map(|entry| (shortlist[entry.index].candidate.id.clone(), entry.samples.clone()))
        .collect();

    // Stage 2: the densest survivors get a larger sample and the full taxonomy.
    let survivors: Vec<&Stage1Entry> = stage1
        .iter()
        .filter(|entry| entry.pain_count() > 0)
        .take(settings.stage2_limit)
        .collect();

    let refetched = join_all(survivors.iter().map(|entry| {
        fetch_replies(
            gateway,
            &shortlist[entry.index],
            settings.stage2_sample,
            language,
        )
    }))
    .await;

    for (entry, replies) in survivors.iter().zip(refetched) {
        let thread_id = &shortlist[entry.index].candidate.id;
        if replies.is_empty() {
            tracing::debug!(thread = %thread_id, "no stage 2 replies, keeping stage 1 samples");
            continue;
        }
        match classify_taxonomy(gateway, topic, language, entry.index, &replies).await {
            Ok(classified) => {
                samples.insert(thread_id.clone(), classified);
            }
            Err(e) => {
                tracing::warn!(thread = %thread_id, error = %e, "stage 2 classification failed, keeping stage 1 samples");
            }
        }
    }

    tracing::info!(promoted = survivors.len(), "deep stage 2 complete");

    DeepOutcome {
        samples,
        stage1_scanned,
        stage2_scanned: survivors.len(),
    }
}

/// Replace the lexical pain signal of every deep-classified thread with its
/// sampled one, blend the density into the score, re-sort, and drop threads
/// the blend pushed below [`MIN_SCORE`].
pub fn apply_outcome(threads: &mut Vec<ScoredThread>, outcome: &DeepOutcome) {
    for thread in threads.iter_mut() {
        let Some(samples) = outcome.samples.get(&thread.candidate.id) else {
            continue;
        };
        if samples.is_empty() {
            continue;
        }
        let signal = signal_from_samples(samples, thread.pain_signal.matched_keywords.clone());
        thread.score = clamp_score(0.5 * f64::from(thread.score) + 50.0 * signal.density);
        thread.why_surfaced = format!(
            "{}/{} sampled replies express pain; {}",
            signal.pain_count, signal.sample_size, thread.why_surfaced
        );
        thread.pain_signal = signal;
    }
    threads.sort_by(|a, b| b.score.cmp(&a.score));
    threads.retain(|t| t.score >= MIN_SCORE);
}

/// Aggregate classified samples into a pain signal.
#[must_use]
pub fn signal_from_samples(samples: &[ClassifiedSample], matched_keywords: Vec<String>) -> PainSignal {
    let pain: Vec<&ClassifiedSample> = samples.iter().filter(|s| s.is_pain).collect();
    let top_pain_quote = pain.first().map(|s| {
        s.key_quote
            .clone()
            .unwrap_or_else(|| shorten(&s.text))
    });
    PainSignal {
        density: density(pain.len(), samples.len()),
        pain_count: u32::try_from(pain.len()).unwrap_or(u32::MAX),
        sample_size: u32::try_from(samples.len()).unwrap_or(u32::MAX),
        top_pain_quote,
        matched_keywords,
    }
}

#[allow(clippy::cast_precision_loss)]
fn density(pain: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        pain as f64 / total as f64
    }
}

fn shorten(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= QUOTE_MAX_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(QUOTE_MAX_CHARS).collect();
    format!("{}...", cut.trim_end())
}

fn reply_key(thread: usize, reply: usize) -> String {
    format!("{thread}:{reply}")
}

async fn fetch_replies(
    gateway: &ModelGateway,
    thread: &ScoredThread,
    limit: usize,
    language: Option<&str>,
) -> Vec<Reply> {
    let candidate = &thread.candidate;
    let mut prompt = format!(
        "Find up to {limit} replies to the X post at {url}\n\
         Original post by @{author}: \"{text}\"\n\n\
         Quote each reply verbatim. Skip replies that are only emoji, links or tags.\n",
        url = candidate.url,
        author = candidate.author.username,
        text = candidate.text,
    );
    if let Some(lang) = language {
        let _ = writeln!(prompt, "Keep replies in their original language ({lang} expected).");
    }
    prompt.push_str(
        "Return only JSON: {\"replies\": [{\"id\": \"...\", \"text\": \"...\", \"author\": \"...\"}]}\n\
         If you cannot find any, return {\"replies\": []}.",
    );
    let request = CompletionRequest::new(prompt)
        .system("You look up replies to social media posts and report them verbatim as JSON.")
        .web_search(true)
        .max_tokens(3_000);

    match gateway.call(ServiceKind::Search, &request).await {
        Ok(text) => {
            let mut replies = parse_replies(&text, &candidate.id);
            replies.truncate(limit);
            tracing::debug!(thread = %candidate.id, count = replies.len(), "fetched replies");
            replies
        }
        Err(e) => {
            tracing::warn!(thread = %candidate.id, error = %e, "reply fetch failed");
            Vec::new()
        }
    }
}

fn parse_replies(raw: &str, thread_id: &str) -> Vec<Reply> {
    let mut elements = match parser::parse_object(raw) {
        Ok(mut value) => match value.get_mut("replies").map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        Err(_) => Vec::new(),
    };
    if elements.is_empty() {
        elements = parser::extract_array_elements(raw, "replies");
    }

    elements
        .iter()
        .enumerate()
        .filter_map(|(i, value)| {
            let text = value
                .get("text")
                .or_else(|| value.get("content"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty())?
                .to_string();
            let id = match value.get("id") {
                Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
                Some(Value::Number(n)) => n.to_string(),
                _ => format!("{thread_id}-r{i}"),
            };
            let author = match value.get("author") {
                Some(Value::String(s)) => Some(s.trim_start_matches('@').to_string()),
                Some(obj @ Value::Object(_)) => obj
                    .get("username")
                    .and_then(Value::as_str)
                    .map(|s| s.trim_start_matches('@').to_string()),
                _ => None,
            };
            Some(Reply { id, text, author })
        })
        .collect()
}

/// Verdicts keyed by reply key, limited to `expected` keys. An answer that
/// labels none of them is an error.
fn parse_verdicts(raw: &str, expected: &[String]) -> Result<HashMap<String, Verdict>, ParseError> {
    let mut elements = match parser::parse_object(raw) {
        Ok(mut value) => match value.get_mut("results").map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        Err(_) => Vec::new(),
    };
    if elements.is_empty() {
        elements = parser::extract_array_elements(raw, "results");
    }
    if elements.is_empty() {
        return Err(ParseError::NoStructuredOutputFound);
    }

    let verdicts: HashMap<String, Verdict> = elements
        .into_iter()
        .filter_map(|value| serde_json::from_value::<Verdict>(value).ok())
        .map(|verdict| (verdict.key.trim().trim_matches(['[', ']']).to_string(), verdict))
        .filter(|(key, _)| expected.contains(key))
        .collect();
    if verdicts.is_empty() {
        return Err(ParseError::Empty("verdicts"));
    }
    Ok(verdicts)
}

fn reply_keys(index: usize, replies: &[Reply]) -> impl Iterator<Item = String> {
    (0..replies.len()).map(move |r| reply_key(index, r))
}

fn render_replies(prompt: &mut String, index: usize, replies: &[Reply]) {
    for (r, reply) in replies.iter().enumerate() {
        let text = reply.text.replace('\n', " ");
        let _ = writeln!(prompt, "[{}] {text}", reply_key(index, r));
    }
}

async fn classify_pain(
    gateway: &ModelGateway,
    topic: &str,
    language: Option<&str>,
    batch: &[(usize, Vec<Reply>)],
) -> Result<HashMap<String, Verdict>, FinderError> {
    let mut prompt = format!(
        "Topic: \"{topic}\"\n\
         For each reply below, decide whether its author expresses their own pain, \
         frustration or unmet need related to the topic.\n"
    );
    if let Some(lang) = language {
        let _ = writeln!(prompt, "Replies are mostly written in {lang}.");
    }
    prompt.push('\n');
    for (index, replies) in batch {
        render_replies(&mut prompt, *index, replies);
    }
    prompt.push_str(
        "\nReturn only JSON: {\"results\": [{\"key\": \"<key in brackets>\", \"isPain\": true, \
         \"keyQuote\": \"<short quote or null>\"}]} with one entry per reply.",
    );

    let request = CompletionRequest::new(prompt)
        .system("You label social media replies. Reply with a single JSON object.")
        .max_tokens(2_500)
        .temperature(0.0);
    let expected: Vec<String> = batch
        .iter()
        .flat_map(|(index, replies)| reply_keys(*index, replies))
        .collect();
    let text = gateway.call(ServiceKind::Classify, &request).await?;
    Ok(parse_verdicts(&text, &expected)?)
}

async fn classify_taxonomy(
    gateway: &ModelGateway,
    topic: &str,
    language: Option<&str>,
    index: usize,
    replies: &[Reply],
) -> Result<Vec<ClassifiedSample>, FinderError> {
    let mut prompt = format!(
        "Topic: \"{topic}\"\n\
         Classify each reply below as exactly one of:\n\
         - pain: the author's own frustration or unmet need around the topic\n\
         - curiosity: the author asks about or wonders about it\n\
         - objection: the author pushes back or disagrees\n\
         - fluff: anything else\n"
    );
    if let Some(lang) = language {
        let _ = writeln!(prompt, "Replies are mostly written in {lang}.");
    }
    prompt.push('\n');
    render_replies(&mut prompt, index, replies);
    prompt.push_str(
        "\nReturn only JSON: {\"results\": [{\"key\": \"<key in brackets>\", \
         \"classification\": \"pain|curiosity|objection|fluff\", \
         \"keyQuote\": \"<short quote or null>\"}]} with one entry per reply.",
    );

    let request = CompletionRequest::new(prompt)
        .system("You label social media replies. Reply with a single JSON object.")
        .max_tokens(3_000)
        .temperature(0.0);
    let expected: Vec<String> = reply_keys(index, replies).collect();
    let text = gateway.call(ServiceKind::Classify, &request).await?;
    let mut verdicts = parse_verdicts(&text, &expected)?;

    Ok(replies
        .iter()
        .enumerate()
        .map(|(r, reply)| taxonomy_sample(reply, verdicts.remove(&reply_key(index, r))))
        .collect())
}

fn clean_quote(quote: Option<String>) -> Option<String> {
    quote
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty() && q != "null")
}

fn binary_sample(reply: &Reply, verdict: Option<Verdict>) -> ClassifiedSample {
    let (is_pain, key_quote) = verdict.map_or((false, None), |v| {
        (v.is_pain.unwrap_or(false), clean_quote(v.key_quote))
    });
    ClassifiedSample {
        id: reply.id.clone(),
        text: reply.text.clone(),
        author: reply.author.clone(),
        is_pain,
        classification: if is_pain {
            Classification::Pain
        } else {
            Classification::Fluff
        },
        key_quote,
    }
}

fn taxonomy_sample(reply: &Reply, verdict: Option<Verdict>) -> ClassifiedSample {
    let (classification, key_quote) = verdict.map_or((Classification::Fluff, None), |v| {
        let label = v
            .classification
            .as_deref()
            .and_then(Classification::from_label)
            .or_else(|| v.is_pain.filter(|p| *p).map(|_| Classification::Pain))
            .unwrap_or(Classification::Fluff);
        (label, clean_quote(v.key_quote))
    });
    ClassifiedSample {
        id: reply.id.clone(),
        text: reply.text.clone(),
        author: reply.author.clone(),
        is_pain: classification == Classification::Pain,
        classification,
        key_quote,
    }
}
