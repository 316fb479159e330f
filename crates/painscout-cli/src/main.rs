mod find;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use painscout_finder::AudienceRegistry;
use tracing_subscriber::EnvFilter;

use crate::find::FindArgs;

#[derive(Debug, Parser)]
#[command(name = "painscout")]
#[command(about = "Find social posts where people struggle with a topic")]
struct Cli {
    /// YAML file with extra audience presets [default: $PAINSCOUT_AUDIENCES_PATH]
    #[arg(long, global = true)]
    audiences_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Search for pain signals around a topic and rank the threads
    Find(FindArgs),
    /// List the available audience presets
    Audiences,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Find(args) => {
            let config = painscout_core::load_app_config_from_env()?;
            init_tracing(&config.log_level)?;
            let audiences_file = cli.audiences_file.or_else(|| config.audiences_path.clone());
            let registry = load_registry(audiences_file.as_deref())?;
            find::run_find(&config, registry, &args).await?;
        }
        Commands::Audiences => {
            init_tracing("warn")?;
            let audiences_file = cli
                .audiences_file
                .or_else(painscout_core::audiences_path_from_env);
            let registry = load_registry(audiences_file.as_deref())?;
            print_audiences(&registry);
        }
    }

    Ok(())
}

/// Log to stderr so `--json` output on stdout stays machine-readable.
fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn load_registry(path: Option<&Path>) -> anyhow::Result<AudienceRegistry> {
    let registry = AudienceRegistry::builtin();
    let Some(path) = path else {
        return Ok(registry);
    };
    let file = painscout_core::load_audiences(path)?;
    tracing::info!(path = %path.display(), count = file.audiences.len(), "loaded audience presets");
    Ok(registry.with_file(file))
}

fn print_audiences(registry: &AudienceRegistry) {
    println!("{:<18}{:<42}HASHTAGS", "AUDIENCE", "KEYWORDS");
    for (name, config) in registry.iter() {
        println!(
            "{:<18}{:<42}{}",
            name,
            config.identifying_keywords.join(", "),
            config.hashtags.join(", ")
        );
    }
}

#[cfg(test)]
mod tests;
