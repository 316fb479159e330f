use std::collections::HashSet;

use painscout_core::AudienceConfig;

const TOPIC_TEMPLATES: [&str; 4] = [
    "people struggling with {topic}",
    "{topic} frustrated OR annoying OR problem",
    "{topic} need help or advice",
    "anyone else having trouble with {topic}",
];

const MAX_AUDIENCE_ANGLES: usize = 2;

/// Search phrasings for one run: four topic angles, then up to two
/// audience-flavored ones. Case-insensitive duplicates are dropped.
#[must_use]
pub fn build_angles(topic: &str, audience: Option<&AudienceConfig>) -> Vec<String> {
    let topic = topic.split_whitespace().collect::<Vec<_>>().join(" ");
    if topic.is_empty() {
        return Vec::new();
    }

    let mut angles: Vec<String> = TOPIC_TEMPLATES
        .iter()
        .map(|template| template.replace("{topic}", &topic))
        .collect();

    if let Some(audience) = audience {
        angles.extend(audience_angles(&topic, audience));
    }

    let mut seen = HashSet::new();
    angles.retain(|angle| seen.insert(angle.to_lowercase()));
    angles
}

fn audience_angles(topic: &str, audience: &AudienceConfig) -> Vec<String> {
    let mut keywords = audience
        .identifying_keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty());
    let hashtag = audience
        .hashtags
        .iter()
        .map(|h| h.trim().trim_start_matches('#'))
        .find(|h| !h.is_empty());

    let mut angles = Vec::with_capacity(MAX_AUDIENCE_ANGLES);
    if let Some(keyword) = keywords.next() {
        angles.push(format!("{keyword} struggling with {topic}"));
    }
    match hashtag {
        Some(tag) => angles.push(format!("#{tag} {topic} problem")),
        None => {
            if let Some(keyword) = keywords.next() {
                angles.push(format!("{keyword} frustrated with {topic}"));
            }
        }
    }
    angles.truncate(MAX_AUDIENCE_ANGLES);
    angles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_only_yields_four_angles() {
        let angles = build_angles("  saas   pricing ", None);
        assert_eq!(
            angles,
            vec![
                "people struggling with saas pricing",
                "saas pricing frustrated OR annoying OR problem",
                "saas pricing need help or advice",
                "anyone else having trouble with saas pricing",
            ]
        );
    }

    #[test]
    fn audience_adds_keyword_and_hashtag_angles() {
        let audience = AudienceConfig {
            hashtags: vec!["#buildinpublic".to_string()],
            identifying_keywords: vec!["indie hacker".to_string(), "solopreneur".to_string()],
            ..AudienceConfig::default()
        };
        let angles = build_angles("pricing", Some(&audience));
        assert_eq!(angles.len(), 6);
        assert_eq!(angles[4], "indie hacker struggling with pricing");
        assert_eq!(angles[5], "#buildinpublic pricing problem");
    }

    #[test]
    fn audience_without_hashtags_uses_second_keyword() {
        let audience = AudienceConfig {
            identifying_keywords: vec!["marketer".to_string(), "seo".to_string()],
            ..AudienceConfig::default()
        };
        let angles = build_angles("attribution", Some(&audience));
        assert_eq!(angles[5], "seo frustrated with attribution");
    }

    #[test]
    fn empty_audience_adds_nothing() {
        let angles = build_angles("pricing", Some(&AudienceConfig::default()));
        assert_eq!(angles.len(), 4);
    }

    #[test]
    fn duplicates_are_dropped_case_insensitively() {
        let audience = AudienceConfig {
            identifying_keywords: vec!["People".to_string()],
            ..AudienceConfig::default()
        };
        // "People struggling with x" collides with the first template.
        let angles = build_angles("x", Some(&audience));
        assert_eq!(angles.len(), 4);
    }

    #[test]
    fn blank_topic_yields_nothing() {
        assert!(build_angles("   ", None).is_empty());
    }
}
