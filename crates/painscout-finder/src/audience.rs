//! Audience presets and resolution of the run's audience option.

use std::collections::BTreeMap;

use painscout_core::{AudienceConfig, AudiencesFile};

/// Audience name that selects the caller-supplied overrides.
pub const CUSTOM_AUDIENCE: &str = "custom";

/// Named audience presets: the built-in set, optionally extended from a file.
#[derive(Debug, Clone)]
pub struct AudienceRegistry {
    presets: BTreeMap<String, AudienceConfig>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

impl AudienceRegistry {
    #[must_use]
    pub fn builtin() -> Self {
        let mut presets = BTreeMap::new();
        presets.insert(
            "indie_hackers".to_string(),
            AudienceConfig {
                key_accounts: strings(&["levelsio", "marc_louvion", "tdinh_me", "dannypostmaa"]),
                hashtags: strings(&["buildinpublic", "indiehackers"]),
                community_urls: strings(&["https://www.indiehackers.com"]),
                identifying_keywords: strings(&[
                    "indie hacker",
                    "solopreneur",
                    "bootstrapped",
                    "side project",
                    "mrr",
                ]),
            },
        );
        presets.insert(
            "saas_founders".to_string(),
            AudienceConfig {
                key_accounts: strings(&["jasonlk", "robwalling", "patio11"]),
                hashtags: strings(&["saas", "startup"]),
                community_urls: strings(&["https://www.reddit.com/r/SaaS"]),
                identifying_keywords: strings(&["saas founder", "b2b saas", "churn", "arr"]),
            },
        );
        presets.insert(
            "developers".to_string(),
            AudienceConfig {
                key_accounts: strings(&["ThePrimeagen", "t3dotgg", "kentcdodds"]),
                hashtags: strings(&["100DaysOfCode", "webdev", "programming"]),
                community_urls: strings(&["https://news.ycombinator.com"]),
                identifying_keywords: strings(&["developer", "programmer", "engineer", "coding"]),
            },
        );
        presets.insert(
            "marketers".to_string(),
            AudienceConfig {
                key_accounts: strings(&["randfish", "aprildunford"]),
                hashtags: strings(&["marketing", "seo", "growthmarketing"]),
                community_urls: strings(&["https://www.reddit.com/r/marketing"]),
                identifying_keywords: strings(&["marketer", "marketing team", "seo", "campaign"]),
            },
        );
        presets.insert(
            "creators".to_string(),
            AudienceConfig {
                key_accounts: strings(&["thejustinwelsh", "dickiebush"]),
                hashtags: strings(&["creatoreconomy", "contentcreator"]),
                community_urls: strings(&["https://www.reddit.com/r/NewTubers"]),
                identifying_keywords: strings(&["creator", "newsletter", "youtube channel", "audience"]),
            },
        );
        Self { presets }
    }

    /// Add presets from a file; file entries replace built-ins of the same name.
    #[must_use]
    pub fn with_file(mut self, file: AudiencesFile) -> Self {
        for (name, config) in file.audiences {
            let key = normalize_name(&name);
            if self.presets.insert(key.clone(), config).is_some() {
                tracing::debug!(audience = %key, "audience preset overridden from file");
            }
        }
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AudienceConfig> {
        self.presets.get(&normalize_name(name))
    }

    /// Preset names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AudienceConfig)> {
        self.presets.iter().map(|(name, config)| (name.as_str(), config))
    }

    /// Resolve the run's audience option.
    ///
    /// - no name: no audience
    /// - `"custom"`: `custom` merged over an empty config (none if that is empty)
    /// - a preset name: that preset
    /// - an unknown name: no audience, with a warning
    #[must_use]
    pub fn resolve(
        &self,
        name: Option<&str>,
        custom: Option<&AudienceConfig>,
    ) -> Option<AudienceConfig> {
        let name = name.map(str::trim).filter(|n| !n.is_empty())?;
        let key = normalize_name(name);

        if key == CUSTOM_AUDIENCE {
            let merged = merge_over(AudienceConfig::default(), custom?);
            return (!merged.is_empty()).then_some(merged);
        }

        let found = self.presets.get(&key).cloned();
        if found.is_none() {
            tracing::warn!(audience = name, "unknown audience preset, continuing without one");
        }
        found
    }
}

impl Default for AudienceRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Lowercase, with spaces and dashes folded to underscores.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Every non-empty field of `overrides` replaces the matching field of `base`.
fn merge_over(mut base: AudienceConfig, overrides: &AudienceConfig) -> AudienceConfig {
    let pairs = [
        (&mut base.key_accounts, &overrides.key_accounts),
        (&mut base.hashtags, &overrides.hashtags),
        (&mut base.community_urls, &overrides.community_urls),
        (&mut base.identifying_keywords, &overrides.identifying_keywords),
    ];
    for (target, source) in pairs {
        let cleaned: Vec<String> = source
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !cleaned.is_empty() {
            *target = cleaned;
        }
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_expected_presets() {
        let registry = AudienceRegistry::builtin();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(
            names,
            vec!["creators", "developers", "indie_hackers", "marketers", "saas_founders"]
        );
        for (_, config) in registry.iter() {
            assert!(!config.identifying_keywords.is_empty());
        }
    }

    #[test]
    fn lookup_normalizes_names() {
        let registry = AudienceRegistry::builtin();
        assert!(registry.get("Indie Hackers").is_some());
        assert!(registry.get("saas-founders").is_some());
    }

    #[test]
    fn no_audience_resolves_to_none() {
        let registry = AudienceRegistry::builtin();
        assert!(registry.resolve(None, None).is_none());
        assert!(registry.resolve(Some("  "), None).is_none());
    }

    #[test]
    fn unknown_preset_resolves_to_none() {
        let registry = AudienceRegistry::builtin();
        assert!(registry.resolve(Some("astronauts"), None).is_none());
    }

    #[test]
    fn custom_merges_overrides_over_empty_defaults() {
        let registry = AudienceRegistry::builtin();
        let overrides = AudienceConfig {
            hashtags: vec![" buildinpublic ".to_string(), String::new()],
            identifying_keywords: vec!["solo founder".to_string()],
            ..AudienceConfig::default()
        };

        let resolved = registry
            .resolve(Some("Custom"), Some(&overrides))
            .expect("custom audience");
        assert_eq!(resolved.hashtags, vec!["buildinpublic"]);
        assert_eq!(resolved.identifying_keywords, vec!["solo founder"]);
        assert!(resolved.key_accounts.is_empty());
    }

    #[test]
    fn custom_without_overrides_is_none() {
        let registry = AudienceRegistry::builtin();
        assert!(registry.resolve(Some("custom"), None).is_none());
        assert!(registry
            .resolve(Some("custom"), Some(&AudienceConfig::default()))
            .is_none());
    }

    #[test]
    fn file_presets_extend_and_override() {
        let mut file = AudiencesFile::default();
        file.audiences.insert(
            "Developers".to_string(),
            AudienceConfig {
                identifying_keywords: vec!["rustacean".to_string()],
                ..AudienceConfig::default()
            },
        );
        file.audiences.insert(
            "bootstrappers".to_string(),
            AudienceConfig {
                identifying_keywords: vec!["bootstrapped founder".to_string()],
                ..AudienceConfig::default()
            },
        );

        let registry = AudienceRegistry::builtin().with_file(file);
        assert_eq!(
            registry.get("developers").unwrap().identifying_keywords,
            vec!["rustacean"]
        );
        assert!(registry.get("bootstrappers").is_some());
        assert_eq!(registry.names().count(), 6);
    }
}
