//! doc-relevance: extract documents and score them for topical relevance

use anyhow::Context;
use clap::Parser;
use doc_relevance::cli::{self, Cli, Commands, ConfigAction, KeywordsAction};
use doc_relevance::config::{Config, OutputFormat};
use doc_relevance::error::{RelevanceError, Result};
use doc_relevance::input::text_extractor::ExtractionClient;
use doc_relevance::output::formatter_for;
use doc_relevance::pipeline::{DocumentProcessor, ProcessingProgress, ProgressCallback};
use doc_relevance::processing::keywords::{
    default_analyzer_keywords, validate_analyzer_keywords, ScoringConfig,
};
use doc_relevance::processing::{DocumentAnalyzer, KeywordAnalyzer, RelevanceScorer};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    // Load configuration
    let loaded = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    // Execute command
    if let Err(e) = run_command(cli.command, config, cli.config).await {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

async fn run_command(command: Commands, config: Config, config_path: Option<PathBuf>) -> Result<()> {
    match command {
        Commands::Analyze {
            input,
            advanced,
            detailed,
            format,
        } => {
            let format = resolve_format(format.as_deref(), &config)?;
            let text = read_input(&input).await?;

            let engine: Box<dyn DocumentAnalyzer> = if advanced || config.batch.use_advanced_scoring {
                Box::new(RelevanceScorer::new(config.scoring_config()?)?)
            } else {
                Box::new(KeywordAnalyzer::new()?.with_fuzzy(config.scoring.enable_fuzzy_matching))
            };
            info!("Analysing {} with the {} strategy", input, engine.strategy());

            let outcome = engine.analyze_document(&input, &text);
            let formatter = formatter_for(
                format,
                config.output.color_output,
                detailed || config.output.detailed,
            );
            println!("{}", formatter.format_analysis(&input, &outcome)?);
        }

        Commands::Extract {
            source,
            timeout,
            detailed,
            format,
        } => {
            let format = resolve_format(format.as_deref(), &config)?;
            let mut client = ExtractionClient::from_config(&config.extraction);
            if let Some(secs) = timeout {
                client = client.with_timeout(Duration::from_secs(secs));
            }

            let result = client.extract_with_retry(&source).await;
            let formatter = formatter_for(
                format,
                config.output.color_output,
                detailed || config.output.detailed,
            );
            println!("{}", formatter.format_extraction(&source, &result)?);

            if !result.success {
                return Err(RelevanceError::Processing(format!(
                    "Extraction of {} failed",
                    source
                )));
            }
        }

        Commands::Batch {
            manifest,
            concurrency,
            advanced,
            force,
            skip_analysis,
            detailed,
            format,
            output,
        } => {
            let format = resolve_format(format.as_deref(), &config)?;
            let items = cli::load_manifest(&manifest)?;
            info!("Loaded {} documents from {}", items.len(), manifest.display());

            let mut options = config.processing_options();
            if let Some(concurrency) = concurrency {
                options.concurrency = concurrency.max(1);
            }
            options.use_advanced_scoring |= advanced;
            options.force_reextract |= force;
            options.skip_analysis |= skip_analysis;

            let processor = DocumentProcessor::from_client(
                ExtractionClient::from_config(&config.extraction),
                KeywordAnalyzer::new()?.with_fuzzy(config.scoring.enable_fuzzy_matching),
                RelevanceScorer::new(config.scoring_config()?)?,
            );

            let pb = ProgressBar::new(items.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );

            let bar = pb.clone();
            let on_progress: ProgressCallback = Arc::new(move |progress: &ProcessingProgress| {
                bar.set_position(progress.processed as u64);
                let eta = progress
                    .eta_ms
                    .map(|ms| format!(" eta {}s", ms / 1000))
                    .unwrap_or_default();
                bar.set_message(format!(
                    "{} failed, {} cached{}",
                    progress.failed, progress.cached, eta
                ));
            });

            let (cancel_tx, cancel_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling batch");
                    let _ = cancel_tx.send(true);
                }
            });

            let batch = processor
                .batch_process_documents_with_cancel(items, &options, Some(on_progress), cancel_rx)
                .await?;
            pb.finish_and_clear();

            if let Some(path) = output {
                let json = serde_json::to_string_pretty(&batch)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write results to {}", path.display()))?;
                info!("Results written to {}", path.display());
            }

            let formatter = formatter_for(
                format,
                config.output.color_output,
                detailed || config.output.detailed,
            );
            println!("{}", formatter.format_batch(&batch)?);

            if batch.cancelled {
                return Err(RelevanceError::Processing("Batch was cancelled".to_string()));
            }
        }

        Commands::Keywords { action } => match action {
            KeywordsAction::Show { analyzer } => {
                if analyzer {
                    for keyword in default_analyzer_keywords() {
                        println!(
                            "{:<28} {:<11} weight {:>4.1}",
                            keyword.term,
                            keyword.category.to_string(),
                            keyword.weight
                        );
                    }
                } else {
                    println!("{}", config.scoring_config()?.to_toml_string()?);
                }
            }
            KeywordsAction::Validate { file } => {
                let scoring = match file {
                    Some(path) => ScoringConfig::load(&path)?,
                    None => config.scoring_config()?,
                };

                let mut report = scoring.validate();
                let analyzer_report = validate_analyzer_keywords(&default_analyzer_keywords());
                report.issues.extend(analyzer_report.issues);
                report.warnings.extend(analyzer_report.warnings);

                for warning in &report.warnings {
                    println!("warning: {}", warning);
                }
                for issue in &report.issues {
                    println!("issue: {}", issue);
                }

                if !report.is_valid() {
                    return Err(RelevanceError::Configuration(format!(
                        "{} keyword issue(s) found",
                        report.issues.len()
                    )));
                }
                println!(
                    "{} keywords OK ({} warnings)",
                    scoring.keywords.len(),
                    report.warnings.len()
                );
            }
        },

        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => {
                let content = toml::to_string_pretty(&config).map_err(|e| {
                    RelevanceError::Configuration(format!("Failed to serialize config: {}", e))
                })?;
                println!("{}", content);
            }
            ConfigAction::Path => {
                println!("{}", config_path.unwrap_or_else(Config::config_path).display());
            }
            ConfigAction::Reset => {
                let defaults = Config::default();
                match config_path {
                    Some(path) => defaults.save_to(&path)?,
                    None => defaults.save()?,
                }
                println!("Configuration reset to defaults");
            }
        },
    }

    Ok(())
}

fn resolve_format(flag: Option<&str>, config: &Config) -> Result<OutputFormat> {
    match flag {
        Some(value) => cli::parse_output_format(value).map_err(RelevanceError::InvalidInput),
        None => Ok(config.output.format),
    }
}

async fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut text = String::new();
        tokio::io::stdin().read_to_string(&mut text).await?;
        return Ok(text);
    }

    let text = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read {}", input))?;
    Ok(text)
}
