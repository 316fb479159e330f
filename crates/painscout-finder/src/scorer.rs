//! Quick lexical scoring of candidates from their text alone.
//!
//! Matching runs on a normalized copy of the text: lowercased, apostrophes
//! removed, every other non-alphanumeric character folded to a space, padded
//! with a space on both ends. Single-word terms of four or more characters
//! match as word prefixes (`problem` matches `problems`); shorter terms and
//! phrases must match whole words.

use std::collections::HashSet;

use crate::keywords::KeywordSet;
use crate::types::{PainSignal, ScoredThread, ThreadCandidate};

/// Threads scoring below this are dropped from the result.
pub const MIN_SCORE: u8 = 10;
/// Maximum threads returned by one run.
pub const MAX_THREADS: usize = 15;

const QUOTE_MAX_CHARS: usize = 140;

/// Word lists the scorer matches against.
///
/// The default is English; other languages can supply their own lists.
/// Model-derived topic and pain keywords are matched in any language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexicon {
    /// First-person expressions of pain ("i'm stuck", "driving me crazy").
    pub experienced_pain: Vec<String>,
    /// Pain vocabulary without a clear speaker.
    pub generic_pain: Vec<String>,
    /// Markers of posts that hand out advice rather than ask for it.
    pub advice: Vec<String>,
    /// Markers of posts asking others for help.
    pub question: Vec<String>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

impl Lexicon {
    #[must_use]
    pub fn english() -> Self {
        Self {
            experienced_pain: owned(&[
                "i'm struggling",
                "i am struggling",
                "i've been struggling",
                "i'm stuck",
                "i am stuck",
                "i can't",
                "i cannot",
                "anyone else",
                "still no",
                "zero customers",
                "burned out",
                "burnt out",
                "giving up",
                "i hate",
                "i'm so frustrated",
                "i'm frustrated",
                "i am frustrated",
                "frustrating me",
                "driving me crazy",
                "driving me nuts",
                "losing my mind",
                "i gave up",
                "i give up",
                "i wasted",
                "i've wasted",
                "i'm tired of",
                "i'm sick of",
                "my biggest struggle",
                "killing me",
                "i keep running into",
                "why can't i",
            ]),
            generic_pain: owned(&[
                "frustrating",
                "frustrated",
                "frustration",
                "annoying",
                "struggle",
                "struggling",
                "nightmare",
                "painful",
                "broken",
                "sucks",
                "confusing",
                "overwhelm",
                "impossible",
                "hate",
                "headache",
                "waste of time",
                "doesn't work",
                "not working",
                "pain point",
                "stuck",
                "problem",
                "issue",
                "fail",
            ]),
            advice: owned(&[
                "unpopular opinion",
                "my secret",
                "how i built",
                "this is how",
                "here's how",
                "here is how",
                "pro tip",
                "tips for",
                "tips to",
                "you should",
                "you need to",
                "the key is",
                "the secret to",
                "step by step",
                "lessons learned",
                "how to fix",
                "how i fixed",
                "do this instead",
                "stop doing",
                "a thread on",
                "my framework",
            ]),
            question: owned(&[
                "anyone know",
                "does anyone",
                "has anyone",
                "looking for",
                "how do i",
                "how do you",
                "what's the best",
                "what is the best",
                "any recommendations",
                "any tips",
                "should i",
                "can someone",
                "is there a way",
                "is there any",
                "what am i missing",
                "need help",
                "need advice",
            ]),
        }
    }
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::english()
    }
}

/// A term prepared for matching against normalized, padded text.
#[derive(Debug, Clone)]
struct Term {
    label: String,
    needle: String,
}

impl Term {
    fn new(raw: &str) -> Option<Self> {
        let normalized = normalize(raw);
        if normalized.is_empty() {
            return None;
        }
        let prefix = !normalized.contains(' ') && normalized.chars().count() >= 4;
        let needle = if prefix {
            format!(" {normalized}")
        } else {
            format!(" {normalized} ")
        };
        Some(Self {
            label: raw.trim().to_lowercase(),
            needle,
        })
    }
}

fn prepare(raw: &[String]) -> Vec<Term> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|t| Term::new(t))
        .filter(|t| seen.insert(t.needle.clone()))
        .collect()
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}' | '\u{2018}'))
        .flat_map(|c| {
            let mapped = if c.is_alphanumeric() { c } else { ' ' };
            mapped.to_lowercase()
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn padded(text: &str) -> String {
    format!(" {} ", normalize(text))
}

fn matched<'t>(terms: &'t [Term], haystack: &str) -> Vec<&'t Term> {
    terms.iter().filter(|t| haystack.contains(&t.needle)).collect()
}

/// What the lexicon found in one post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TextSignals {
    topic: Vec<String>,
    pain: Vec<String>,
    generic: Vec<String>,
    experienced: Vec<String>,
    experienced_quote: Option<String>,
    is_advice: bool,
    is_question: bool,
}

/// Scores candidates for one run's keywords and lexicon.
#[derive(Debug, Clone)]
pub struct Scorer {
    topic: Vec<Term>,
    pain: Vec<Term>,
    experienced: Vec<Term>,
    generic: Vec<Term>,
    advice: Vec<Term>,
    question: Vec<Term>,
}

impl Scorer {
    #[must_use]
    pub fn new(lexicon: &Lexicon, keywords: &KeywordSet) -> Self {
        Self {
            topic: prepare(&keywords.topic_keywords),
            pain: prepare(&keywords.pain_keywords),
            experienced: prepare(&lexicon.experienced_pain),
            generic: prepare(&lexicon.generic_pain),
            advice: prepare(&lexicon.advice),
            question: prepare(&lexicon.question),
        }
    }

    fn signals(&self, text: &str) -> TextSignals {
        let haystack = padded(text);
        let labels = |terms: &[Term]| -> Vec<String> {
            matched(terms, &haystack)
                .into_iter()
                .map(|t| t.label.clone())
                .collect()
        };

        let experienced_terms = matched(&self.experienced, &haystack);
        let experienced_quote = experienced_terms
            .first()
            .and_then(|term| sentence_containing(text, term));

        TextSignals {
            topic: labels(&self.topic),
            pain: labels(&self.pain),
            generic: labels(&self.generic),
            experienced: experienced_terms.iter().map(|t| t.label.clone()).collect(),
            experienced_quote,
            is_advice: !matched(&self.advice, &haystack).is_empty(),
            is_question: text.contains('?') || !matched(&self.question, &haystack).is_empty(),
        }
    }

    /// Score one candidate; the score is always within `0..=100`.
    #[must_use]
    pub fn score(&self, candidate: &ThreadCandidate) -> ScoredThread {
        let signals = self.signals(&candidate.text);
        let replies = candidate.metrics.replies_or_zero();

        let topic_relevance = (as_f64(signals.topic.len()) * 0.3).min(1.0);
        let on_topic = topic_relevance >= 0.3 || !signals.topic.is_empty();
        let experienced = !signals.experienced.is_empty();
        let advice_not_question = signals.is_advice && !signals.is_question;
        let on_topic_question = signals.is_question && on_topic;

        let mut raw_pain = (0.1
            + 0.25 * as_f64(signals.experienced.len())
            + 0.08 * as_f64(signals.generic.len())
            + 0.1 * as_f64(signals.pain.len()))
        .min(1.0);
        if advice_not_question {
            raw_pain *= 0.2;
        }
        let pain_score = if on_topic {
            raw_pain * (0.5 + 0.5 * topic_relevance)
        } else {
            raw_pain * 0.2
        };
        let engagement = (f64::from(replies.saturating_add(1)).log10() / 2.5).min(1.0);

        let mut total = topic_relevance * 30.0 + pain_score * 50.0 + engagement * 20.0;
        if experienced {
            total += 15.0;
        }
        if advice_not_question {
            total -= 25.0;
        }
        if on_topic_question {
            total += 10.0;
        }

        let why_surfaced = why_surfaced(&signals, on_topic, advice_not_question, replies);

        let mut matched_keywords = signals.topic.clone();
        for keyword in &signals.pain {
            if !matched_keywords.contains(keyword) {
                matched_keywords.push(keyword.clone());
            }
        }

        let pain_count = signals.experienced.len() + signals.generic.len() + signals.pain.len();

        ScoredThread {
            candidate: candidate.clone(),
            score: clamp_score(total),
            pain_signal: PainSignal {
                density: pain_score.clamp(0.0, 1.0),
                pain_count: u32::try_from(pain_count).unwrap_or(u32::MAX),
                sample_size: 0,
                top_pain_quote: signals.experienced_quote,
                matched_keywords,
            },
            why_surfaced,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(n: usize) -> f64 {
    n as f64
}

/// Round, floor at 0, cap at 100.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn clamp_score(total: f64) -> u8 {
    if total.is_nan() {
        return 0;
    }
    total.round().clamp(0.0, 100.0) as u8
}

fn why_surfaced(
    signals: &TextSignals,
    on_topic: bool,
    advice_not_question: bool,
    replies: u32,
) -> String {
    if let Some(quote) = &signals.experienced_quote {
        return format!("First-hand pain: \"{quote}\"");
    }
    if signals.is_question && on_topic {
        return format!("Asks for help with {}", signals.topic.join(", "));
    }
    if advice_not_question {
        return "Reads as advice rather than a request for help".to_string();
    }

    let mut pain_words = signals.pain.clone();
    for word in &signals.generic {
        if !pain_words.contains(word) {
            pain_words.push(word.clone());
        }
    }

    match (signals.topic.is_empty(), pain_words.is_empty()) {
        (false, false) => format!(
            "Mentions {} alongside {}",
            signals.topic.join(", "),
            pain_words.join(", ")
        ),
        (false, true) => format!("Mentions {}", signals.topic.join(", ")),
        (true, false) => format!("Pain language: {}", pain_words.join(", ")),
        (true, true) => format!("{replies} replies"),
    }
}

/// The sentence of `text` in which `term` occurs, trimmed and shortened.
fn sentence_containing(text: &str, term: &Term) -> Option<String> {
    let sentence = text
        .split_inclusive(['.', '!', '?', '\n'])
        .find(|s| padded(s).contains(&term.needle))?
        .trim();
    if sentence.is_empty() {
        return None;
    }
    if sentence.chars().count() <= QUOTE_MAX_CHARS {
        return Some(sentence.to_string());
    }
    let cut: String = sentence.chars().take(QUOTE_MAX_CHARS).collect();
    Some(format!("{}...", cut.trim_end()))
}

/// Keep threads scoring at least [`MIN_SCORE`], highest first (ties keep
/// their input order), at most [`MAX_THREADS`].
#[must_use]
pub fn rank(mut threads: Vec<ScoredThread>) -> Vec<ScoredThread> {
    threads.retain(|t| t.score >= MIN_SCORE);
    threads.sort_by(|a, b| b.score.cmp(&a.score));
    threads.truncate(MAX_THREADS);
    threads
}

/// Score every candidate and rank the result.
#[must_use]
pub fn score_and_rank(
    candidates: &[ThreadCandidate],
    keywords: &KeywordSet,
    lexicon: &Lexicon,
) -> Vec<ScoredThread> {
    let scorer = Scorer::new(lexicon, keywords);
    rank(candidates.iter().map(|c| scorer.score(c)).collect())
}
