//! `find` command: run the finder once and print the ranked threads.

use std::sync::Arc;

use clap::Args;
use painscout_core::{AppConfig, AudienceConfig};
use painscout_finder::{AudienceRegistry, Finder, FinderInput, FinderResult, FinderSettings};
use painscout_llm::{BudgetGovernor, ChatClient};

const WHY_WIDTH: usize = 80;

#[derive(Debug, Args)]
pub struct FindArgs {
    /// Topic to search for, e.g. "usage-based pricing"
    pub topic: String,

    /// Preferred language of posts and keywords
    #[arg(long)]
    pub language: Option<String>,

    /// Drop posts reporting fewer replies than this
    #[arg(long, default_value_t = painscout_finder::DEFAULT_MIN_REPLIES)]
    pub min_replies: u32,

    /// Audience preset name (see `painscout audiences`)
    #[arg(long, conflicts_with_all = ["custom_keyword", "custom_hashtag"])]
    pub audience: Option<String>,

    /// Identifying keyword for a custom audience (repeatable)
    #[arg(long)]
    pub custom_keyword: Vec<String>,

    /// Hashtag for a custom audience (repeatable)
    #[arg(long)]
    pub custom_hashtag: Vec<String>,

    /// Sample and classify replies for the shortlist (more calls, better signal)
    #[arg(long)]
    pub deep: bool,

    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,
}

impl FindArgs {
    #[must_use]
    pub fn to_input(&self) -> FinderInput {
        let mut input = FinderInput::new(self.topic.clone())
            .min_replies(self.min_replies)
            .deep(self.deep);
        if let Some(language) = &self.language {
            input = input.language(language.clone());
        }
        if !self.custom_keyword.is_empty() || !self.custom_hashtag.is_empty() {
            input = input.custom_audience(AudienceConfig {
                identifying_keywords: self.custom_keyword.clone(),
                hashtags: self.custom_hashtag.clone(),
                ..AudienceConfig::default()
            });
        } else if let Some(audience) = &self.audience {
            input = input.audience(audience.clone());
        }
        input
    }
}

/// Build the model clients from config, run one search, and print it.
///
/// # Errors
///
/// Returns an error if a client cannot be built, JSON output fails, or the
/// run itself reports failure.
pub(crate) async fn run_find(
    config: &AppConfig,
    registry: AudienceRegistry,
    args: &FindArgs,
) -> anyhow::Result<()> {
    let search = ChatClient::new(
        &config.search.api_key,
        &config.search.base_url,
        &config.search.model,
        config.search.timeout_secs,
    )?;
    let classify = ChatClient::new(
        &config.classify.api_key,
        &config.classify.base_url,
        &config.classify.model,
        config.classify.timeout_secs,
    )?;

    let governor = Arc::new(BudgetGovernor::new(
        config.monthly_budget,
        config.window_limit,
    ));
    let finder = Finder::new(Arc::new(search), Arc::new(classify), governor)
        .with_registry(registry)
        .with_settings(FinderSettings::from_app_config(config));

    let result = finder.run(&args.to_input()).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_table(&result);
    }

    if !result.success {
        anyhow::bail!(
            "finder run failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn print_table(result: &FinderResult) {
    if result.threads.is_empty() {
        if result.success {
            println!("no threads found; try a broader topic or --min-replies 0");
        }
    } else {
        println!("{:<7}{:<9}{:<18}WHY", "SCORE", "REPLIES", "AUTHOR");
        for thread in &result.threads {
            let replies = thread
                .candidate
                .metrics
                .replies
                .map_or_else(|| "?".to_string(), |r| r.to_string());
            let author = format!("@{}", thread.candidate.author.username);
            println!(
                "{:<7}{:<9}{:<18}{}",
                thread.score,
                replies,
                author,
                truncate(&thread.why_surfaced, WHY_WIDTH)
            );
            println!("{:<34}{}", "", thread.candidate.url);
        }
    }

    println!();
    println!("angles:         {}", result.query_used.join(" | "));
    println!("topic keywords: {}", result.topic_keywords.join(", "));
    println!("pain keywords:  {}", result.pain_keywords.join(", "));
    println!(
        "stats: {} candidates, {} stage-1, {} stage-2, {} api reads",
        result.stats.candidates_fetched,
        result.stats.stage1_scanned,
        result.stats.stage2_scanned,
        result.stats.total_api_reads
    );
    println!(
        "budget: window {}/{}, {} calls left this month",
        result.rate_limit_status.remaining,
        result.rate_limit_status.limit,
        result.rate_limit_status.monthly_remaining
    );
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let cut: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::truncate;

    #[test]
    fn truncate_respects_width() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
    }
}
