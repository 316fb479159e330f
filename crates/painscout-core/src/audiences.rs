use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Vocabulary and reference points that identify one audience on social media.
///
/// Every field defaults to empty so partial YAML entries and custom overrides
/// deserialize cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudienceConfig {
    pub key_accounts: Vec<String>,
    pub hashtags: Vec<String>,
    pub community_urls: Vec<String>,
    pub identifying_keywords: Vec<String>,
}

impl AudienceConfig {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.key_accounts.is_empty()
            && self.hashtags.is_empty()
            && self.community_urls.is_empty()
            && self.identifying_keywords.is_empty()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AudiencesFile {
    #[serde(default)]
    pub audiences: BTreeMap<String, AudienceConfig>,
}

/// Load and validate extra audience presets from a YAML file.
///
/// ```yaml
/// audiences:
///   bootstrappers:
///     identifying_keywords: ["bootstrapped founder", "solo founder"]
///     hashtags: ["#bootstrapped"]
/// ```
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_audiences(path: &Path) -> Result<AudiencesFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::AudiencesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_audiences(&content)
}

fn parse_audiences(content: &str) -> Result<AudiencesFile, ConfigError> {
    let file: AudiencesFile = serde_yaml::from_str(content)?;
    validate_audiences(&file)?;
    Ok(file)
}

fn validate_audiences(file: &AudiencesFile) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for (name, audience) in &file.audiences {
        let normalized = name.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ConfigError::Validation(
                "audience name must be non-empty".to_string(),
            ));
        }
        if normalized == "custom" {
            return Err(ConfigError::Validation(
                "'custom' is reserved for ad-hoc audiences".to_string(),
            ));
        }
        if !seen.insert(normalized) {
            return Err(ConfigError::Validation(format!(
                "duplicate audience name: '{name}'"
            )));
        }
        if audience.identifying_keywords.is_empty() {
            return Err(ConfigError::Validation(format!(
                "audience '{name}' needs at least one identifying keyword"
            )));
        }
    }

    Ok(())
}
