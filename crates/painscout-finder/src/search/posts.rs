//! Request and response handling for one search angle.
//!
//! The search model is asked for `{"tweets": [...]}` but field names, count
//! formats and author shapes vary from answer to answer, so posts are
//! deserialized leniently and anything without text or a resolvable post id
//! is dropped.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use painscout_core::AudienceConfig;
use painscout_llm::CompletionRequest;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::parser;
use crate::types::{Author, ThreadCandidate, ThreadMetrics};

/// Posts requested per angle.
pub const POSTS_PER_ANGLE: usize = 15;

static STATUS_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/status(?:es)?/(\d+)").expect("valid status id regex"));

static STATUS_USER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:x|twitter)\.com/([A-Za-z0-9_]{1,15})/status").expect("valid status user regex")
});

/// Numeric post id from a status URL (`.../status/123` or `.../statuses/123`).
#[must_use]
pub fn extract_post_id(url: &str) -> Option<String> {
    STATUS_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn extract_username(url: &str) -> Option<String> {
    STATUS_USER
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|user| user != "i")
}

pub(crate) fn search_request(
    angle: &str,
    topic: &str,
    language: Option<&str>,
    audience: Option<&AudienceConfig>,
) -> CompletionRequest {
    let mut prompt = format!(
        "Search X (Twitter) for recent posts matching: {angle}\n\
         The underlying topic is \"{topic}\".\n\n\
         Return up to {POSTS_PER_ANGLE} posts, choosing in this order of priority:\n\
         1. first-person pain: the author describes their own frustration or struggle\n\
         2. direct questions asking others for help\n\
         3. general discussion of problems with the topic\n\
         4. generic agreement with someone else's complaint\n\
         Exclude advice threads, tips, tutorials, news, and promotional posts.\n"
    );

    if let Some(lang) = language {
        prompt.push_str(&format!("Prefer posts written in {lang}.\n"));
    }
    if let Some(audience) = audience {
        if !audience.identifying_keywords.is_empty() {
            prompt.push_str(&format!(
                "Favor authors who describe themselves with: {}.\n",
                audience.identifying_keywords.join(", ")
            ));
        }
        if !audience.key_accounts.is_empty() {
            prompt.push_str(&format!(
                "Replies to or posts near these accounts are good sources: {}.\n",
                audience.key_accounts.join(", ")
            ));
        }
    }

    prompt.push_str(
        "\nReturn only JSON in exactly this shape:\n\
         {\"tweets\": [{\"url\": \"https://x.com/<user>/status/<id>\", \"text\": \"...\", \
         \"author\": {\"username\": \"...\", \"displayName\": \"...\", \"avatarUrl\": \"...\"}, \
         \"createdAt\": \"<RFC 3339>\", \"metrics\": {\"replies\": 0, \"likes\": 0, \"shares\": 0}}]}\n\
         Use real post URLs only. If nothing matches, return {\"tweets\": []}.",
    );

    CompletionRequest::new(prompt)
        .system("You search social media and report posts verbatim as JSON.")
        .web_search(true)
        .max_tokens(4_000)
}

/// Every usable post in one search answer.
///
/// A truncated answer yields the posts that were emitted completely.
pub(crate) fn parse_search_response(raw: &str) -> Vec<ThreadCandidate> {
    let mut elements = parser::parse_object(raw)
        .ok()
        .map(posts_array)
        .unwrap_or_default();

    if elements.is_empty() {
        elements = parser::extract_array_elements(raw, "tweets");
    }
    if elements.is_empty() {
        elements = parser::extract_keyed_objects(raw, "tweet");
    }

    elements
        .into_iter()
        .filter_map(|value| serde_json::from_value::<RawPost>(value).ok())
        .filter_map(RawPost::into_candidate)
        .collect()
}

fn posts_array(mut value: Value) -> Vec<Value> {
    ["tweets", "posts", "results"]
        .iter()
        .find_map(|key| match value.get_mut(*key).map(Value::take) {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        })
        .unwrap_or_default()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPost {
    #[serde(deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(alias = "link", alias = "postUrl", alias = "tweetUrl")]
    url: Option<String>,
    #[serde(alias = "content", alias = "body")]
    text: Option<String>,
    author: Option<RawAuthor>,
    #[serde(alias = "handle", alias = "authorUsername", alias = "author_username")]
    username: Option<String>,
    #[serde(alias = "createdAt", alias = "date", alias = "timestamp")]
    created_at: Option<String>,
    metrics: Option<RawMetrics>,
    #[serde(flatten)]
    top_level_metrics: RawMetrics,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAuthor {
    Handle(String),
    Profile(RawProfile),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawProfile {
    #[serde(alias = "handle", alias = "screenName", alias = "screen_name")]
    username: Option<String>,
    #[serde(alias = "displayName", alias = "name")]
    display_name: Option<String>,
    #[serde(alias = "avatarUrl", alias = "avatar", alias = "profileImageUrl")]
    avatar_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMetrics {
    #[serde(
        alias = "replyCount",
        alias = "reply_count",
        alias = "comments",
        deserialize_with = "lenient_count"
    )]
    replies: Option<u32>,
    #[serde(
        alias = "likeCount",
        alias = "like_count",
        alias = "favorites",
        deserialize_with = "lenient_count"
    )]
    likes: Option<u32>,
    #[serde(
        alias = "retweets",
        alias = "reposts",
        alias = "retweetCount",
        alias = "retweet_count",
        deserialize_with = "lenient_count"
    )]
    shares: Option<u32>,
}

impl RawPost {
    fn into_candidate(self) -> Option<ThreadCandidate> {
        let text = self
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())?
            .to_string();

        let url = self
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());
        let url_id = url.and_then(extract_post_id);
        let raw_id = self
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string);
        let id = url_id.clone().or(raw_id)?;

        let (profile_username, display_name, avatar_url) = match self.author {
            Some(RawAuthor::Handle(handle)) => (Some(handle), None, None),
            Some(RawAuthor::Profile(profile)) => {
                (profile.username, profile.display_name, profile.avatar_url)
            }
            None => (None, None, None),
        };
        let username = profile_username
            .or(self.username)
            .or_else(|| url.and_then(extract_username))
            .map(|u| u.trim().trim_start_matches('@').to_string())
            .unwrap_or_default();
        let display_name = display_name
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| username.clone());

        let url = match (url, url_id) {
            (Some(url), Some(_)) => url.to_string(),
            _ => {
                let user = if username.is_empty() { "i" } else { username.as_str() };
                format!("https://x.com/{user}/status/{id}")
            }
        };

        let nested = self.metrics.unwrap_or_default();
        let top = self.top_level_metrics;
        let metrics = ThreadMetrics {
            replies: nested.replies.or(top.replies),
            likes: nested.likes.or(top.likes).unwrap_or(0),
            shares: nested.shares.or(top.shares).unwrap_or(0),
        };

        Some(ThreadCandidate {
            id,
            url,
            text,
            author: Author {
                username,
                display_name,
                avatar_url: avatar_url.filter(|a| !a.trim().is_empty()),
            },
            created_at: self.created_at.as_deref().and_then(parse_timestamp),
            metrics,
        })
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%a %b %d %H:%M:%S %z %Y"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(count_from_value))
}

fn count_from_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
            .or_else(|| n.as_f64().and_then(float_to_count)),
        Value::String(s) => parse_count_text(s),
        _ => None,
    }
}

/// `"1,204"`, `"3.4K"`, `"2M"`, `"12 replies"`.
fn parse_count_text(raw: &str) -> Option<u32> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',' && *c != '_').collect();
    let numeric_end = cleaned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(cleaned.len());
    let (number, rest) = cleaned.split_at(numeric_end);
    let value: f64 = number.parse().ok()?;
    let multiplier = match rest.trim_start().chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('k') => 1_000.0,
        Some('m') => 1_000_000.0,
        _ => 1.0,
    };
    float_to_count(value * multiplier)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn float_to_count(value: f64) -> Option<u32> {
    (value.is_finite() && value >= 0.0).then(|| value.round().min(f64::from(u32::MAX)) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_id_comes_from_status_urls() {
        assert_eq!(
            extract_post_id("https://x.com/maker/status/1790000000000000001?s=20").as_deref(),
            Some("1790000000000000001")
        );
        assert_eq!(
            extract_post_id("https://twitter.com/i/web/statuses/42").as_deref(),
            Some("42")
        );
        assert_eq!(extract_post_id("https://x.com/maker"), None);
    }

    #[test]
    fn parses_well_formed_answer() {
        let raw = r#"{"tweets": [{
            "url": "https://x.com/maker/status/111",
            "text": "  Stripe tax setup is killing me  ",
            "author": {"username": "@maker", "displayName": "Maker", "avatarUrl": "https://img/a.png"},
            "createdAt": "2026-03-01T10:00:00Z",
            "metrics": {"replies": 14, "likes": "1.2K", "shares": null}
        }]}"#;

        let posts = parse_search_response(raw);
        assert_eq!(posts.len(), 1);
        let post = &posts[0];
        assert_eq!(post.id, "111");
        assert_eq!(post.text, "Stripe tax setup is killing me");
        assert_eq!(post.author.username, "maker");
        assert_eq!(post.author.display_name, "Maker");
        assert_eq!(post.metrics.replies, Some(14));
        assert_eq!(post.metrics.likes, 1_200);
        assert_eq!(post.metrics.shares, 0);
        assert!(post.created_at.is_some());
    }

    #[test]
    fn tolerates_alternate_field_shapes() {
        let raw = r#"Here are the posts:
        {"posts": [
            {"id": 222, "content": "why is invoicing so hard", "author": "founder_x",
             "reply_count": "7", "retweets": 3},
            {"link": "https://twitter.com/dev/status/333", "text": "stuck again", "replies": 2.0}
        ]}"#;

        let posts = parse_search_response(raw);
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, "222");
        assert_eq!(posts[0].url, "https://x.com/founder_x/status/222");
        assert_eq!(posts[0].metrics.replies, Some(7));
        assert_eq!(posts[0].metrics.shares, 3);
        assert_eq!(posts[1].author.username, "dev");
        assert_eq!(posts[1].author.display_name, "dev");
        assert_eq!(posts[1].metrics.replies, Some(2));
    }

    #[test]
    fn drops_posts_without_text_or_id() {
        let raw = r#"{"tweets": [
            {"url": "https://x.com/a/status/1", "text": "   "},
            {"url": "https://x.com/a/profile", "text": "no id anywhere"},
            {"id": "abc", "text": "non-numeric id"},
            {"url": "https://x.com/a/status/2", "text": "kept"}
        ]}"#;
        let posts = parse_search_response(raw);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "2");
    }

    #[test]
    fn unknown_reply_count_stays_unknown() {
        let raw = r#"{"tweets": [{"url": "https://x.com/a/status/5", "text": "hmm"}]}"#;
        let posts = parse_search_response(raw);
        assert_eq!(posts[0].metrics.replies, None);
    }

    #[test]
    fn truncated_answer_keeps_complete_posts() {
        let raw = r#"{"tweets": [
            {"url": "https://x.com/a/status/1", "text": "first"},
            {"url": "https://x.com/b/status/2", "text": "second"},
            {"url": "https://x.com/c/status/3", "text": "thi"#;
        let ids: Vec<String> = parse_search_response(raw).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn count_text_formats() {
        assert_eq!(parse_count_text("1,204"), Some(1_204));
        assert_eq!(parse_count_text("3.4K"), Some(3_400));
        assert_eq!(parse_count_text("2M"), Some(2_000_000));
        assert_eq!(parse_count_text("12 replies"), Some(12));
        assert_eq!(parse_count_text("many"), None);
        assert_eq!(count_from_value(&serde_json::json!(-3)), None);
    }

    #[test]
    fn search_request_enables_web_search_and_language() {
        let request = search_request("people struggling with x", "x", Some("Spanish"), None);
        assert!(request.web_search);
        assert!(request.prompt.contains("Prefer posts written in Spanish"));
        assert!(request.prompt.contains("\"tweets\""));
    }
}
