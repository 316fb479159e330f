//! Candidate search fan-out: one search-model request per angle, run
//! concurrently, each independently time-bounded and allowed to fail.

pub mod angles;
mod posts;

use std::collections::HashSet;

use futures::future::join_all;
use painscout_core::AudienceConfig;

use crate::gateway::{ModelGateway, ServiceKind};
use crate::types::ThreadCandidate;

pub use angles::build_angles;
pub use posts::{extract_post_id, POSTS_PER_ANGLE};

#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Angles in the order they were issued.
    pub angles: Vec<String>,
    /// Unique candidates that passed the reply filter, in angle order.
    pub candidates: Vec<ThreadCandidate>,
    /// Posts returned across all angles before dedup and filtering.
    pub raw_count: usize,
    pub failed_angles: usize,
}

/// Run every angle for `topic` and merge the answers.
///
/// A failed or timed-out angle contributes nothing; the others still count.
pub async fn search_candidates(
    gateway: &ModelGateway,
    topic: &str,
    language: Option<&str>,
    audience: Option<&AudienceConfig>,
    min_replies: u32,
) -> SearchOutcome {
    let angles = build_angles(topic, audience);

    let calls = angles.iter().enumerate().map(|(index, angle)| async move {
        let request = posts::search_request(angle, topic, language, audience);
        match gateway.call(ServiceKind::Search, &request).await {
            Ok(text) => {
                let found = posts::parse_search_response(&text);
                tracing::debug!(angle = index, count = found.len(), "search angle returned");
                Some(found)
            }
            Err(e) => {
                tracing::warn!(angle = index, query = %angle, error = %e, "search angle failed");
                None
            }
        }
    });

    // join_all keeps angle order, so dedup below is deterministic.
    let settled = join_all(calls).await;
    let failed_angles = settled.iter().filter(|batch| batch.is_none()).count();
    let batches: Vec<Vec<ThreadCandidate>> = settled.into_iter().flatten().collect();
    let raw_count = batches.iter().map(Vec::len).sum();
    let candidates = dedup_candidates(batches, min_replies);

    tracing::info!(
        angles = angles.len(),
        failed_angles,
        raw_count,
        kept = candidates.len(),
        "search fan-out complete"
    );

    SearchOutcome {
        angles,
        candidates,
        raw_count,
        failed_angles,
    }
}

/// Merge per-angle batches: first occurrence of each post id wins, then
/// posts with a known reply count below `min_replies` are dropped.
#[must_use]
pub fn dedup_candidates(
    batches: impl IntoIterator<Item = Vec<ThreadCandidate>>,
    min_replies: u32,
) -> Vec<ThreadCandidate> {
    let mut seen = HashSet::new();
    batches
        .into_iter()
        .flatten()
        .filter(|candidate| seen.insert(candidate.id.clone()))
        .filter(|candidate| {
            candidate
                .metrics
                .replies
                .is_none_or(|replies| replies >= min_replies)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Author, ThreadMetrics};

    fn post(id: &str, text: &str, replies: Option<u32>) -> ThreadCandidate {
        ThreadCandidate {
            id: id.to_string(),
            url: format!("https://x.com/u/status/{id}"),
            text: text.to_string(),
            author: Author::default(),
            created_at: None,
            metrics: ThreadMetrics {
                replies,
                ..ThreadMetrics::default()
            },
        }
    }

    #[test]
    fn first_occurrence_wins_in_angle_order() {
        let batches = vec![
            vec![post("1", "angle zero", Some(5)), post("2", "angle zero", Some(5))],
            vec![post("2", "angle one", Some(5)), post("3", "angle one", Some(5))],
        ];
        let merged = dedup_candidates(batches, 2);
        let ids: Vec<&str> = merged.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(merged[1].text, "angle zero");
    }

    #[test]
    fn known_low_reply_counts_are_dropped_unknown_kept() {
        let batches = vec![vec![
            post("1", "a", Some(1)),
            post("2", "b", Some(2)),
            post("3", "c", None),
        ]];
        let ids: Vec<String> = dedup_candidates(batches, 2)
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[test]
    fn zero_min_replies_keeps_everything_unique() {
        let batches = vec![
            vec![post("1", "a", Some(0))],
            vec![post("1", "a", Some(0))],
        ];
        assert_eq!(dedup_candidates(batches, 0).len(), 1);
    }
}
