use puxian::cli::{Cli, Commands, ConfigAction};
use puxian::config::Config;
use puxian::error::{PuxianError, Result};
use puxian::llm::{GenerativeModel, OpenAiCompatibleClient};
use puxian::patterns::IntentPatternRegistry;
use puxian::pipeline::{AnswerPipeline, AnswerResponse, RetrievalReport};
use puxian::query::{QueryClassifier, QueryType, StrategySelector};
use puxian::retrieval::RetrievedDocument;
use std::path::PathBuf;
use std::sync::Arc;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Ask { question, json } => {
            let config = load_config(cli.config, cli.corpus)?;
            runtime()?.block_on(cmd_ask(&config, &question, json))?;
        }
        Commands::Search {
            query,
            query_type,
            json,
        } => {
            let config = load_config(cli.config, cli.corpus)?;
            runtime()?.block_on(cmd_search(&config, &query, query_type, json))?;
        }
        Commands::Classify { query } => {
            let config = load_config(cli.config, cli.corpus)?;
            runtime()?.block_on(cmd_classify(&config, &query))?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "puxian=debug" } else { "puxian=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| PuxianError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })
}

async fn cmd_ask(config: &Config, question: &str, json: bool) -> Result<()> {
    let pipeline = AnswerPipeline::from_config(config).await?;

    let response = match pipeline.answer(question).await {
        Ok(response) => response,
        Err(e @ PuxianError::GenerationTimeout { .. }) => {
            eprintln!("✗ The model did not answer in time. Try again or raise llm.generation_timeout.");
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    if json {
        println!("{}", to_json(&response)?);
    } else {
        print_answer(&response);
    }

    Ok(())
}

fn print_answer(response: &AnswerResponse) {
    println!("{}", response.answer);
    println!();
    println!(
        "Type: {} ({:.2})  Confidence: {:.2}",
        response.query_type, response.classification_confidence, response.confidence
    );
    println!("Strategy: {}", response.strategy);

    if !response.degraded.is_empty() {
        let backends: Vec<&str> = response.degraded.iter().map(|d| d.backend.as_str()).collect();
        println!("Degraded: {}", backends.join(", "));
    }
}

async fn cmd_search(
    config: &Config,
    query: &str,
    query_type: Option<QueryType>,
    json: bool,
) -> Result<()> {
    let pipeline = AnswerPipeline::from_config(config).await?;
    let report = pipeline.retrieve(query, query_type).await?;

    if json {
        let documents: Vec<RetrievedDocument> =
            report.hits.iter().map(RetrievedDocument::from).collect();
        println!("{}", to_json(&documents)?);
        return Ok(());
    }

    print_report(&report);
    Ok(())
}

fn print_report(report: &RetrievalReport) {
    println!(
        "Type: {} ({:.2})  Strategy: {}",
        report.classification.label, report.classification.confidence, report.strategy.description
    );
    if report.variants.len() > 1 {
        println!("Variants: {}", report.variants.join(" | "));
    }
    println!();

    if report.hits.is_empty() {
        println!("No matching documents");
        return;
    }

    for hit in &report.hits {
        println!(
            "{:>2}. [{}] {:.4}  {}",
            hit.rank(),
            hit.source(),
            hit.score(),
            hit.preview(80)
        );
    }

    for degraded in &report.degraded {
        println!("⚠ {}", degraded.reason);
    }
}

async fn cmd_classify(config: &Config, query: &str) -> Result<()> {
    let patterns = match &config.classifier.patterns_file {
        Some(path) => IntentPatternRegistry::from_config_file(path)?,
        None => IntentPatternRegistry::embedded()?,
    };
    let model: Arc<dyn GenerativeModel> = Arc::new(OpenAiCompatibleClient::new(
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm_api_key(),
    ));
    let classifier = QueryClassifier::new(patterns, Some(model), config.classifier_settings()?);

    let classification = classifier.classify(query).await;
    let strategy = StrategySelector::select(classification.label);

    println!("Type:       {}", classification.label);
    println!("Confidence: {:.2}", classification.confidence);
    println!("Source:     {:?}", classification.source);
    println!(
        "Strategy:   {} (candidates {}, final {}, expand {}, temperature {})",
        strategy.description,
        strategy.candidate_depth,
        strategy.final_depth,
        strategy.expand_query,
        strategy.temperature
    );

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, None)?;
            let value = serde_json::to_value(&config).map_err(|e| PuxianError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            let shown = match section {
                Some(section) => value.get(&section).cloned().ok_or_else(|| {
                    PuxianError::Config(format!("Unknown config section: {}", section))
                })?,
                None => value,
            };

            println!("{}", to_json(&shown)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            let config = Config::default();
            config.save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());

            if let Some(config_dir) = path.parent() {
                let intents_path = config_dir.join("intents.toml");
                if force || !intents_path.exists() {
                    std::fs::write(&intents_path, puxian::patterns::DEFAULT_INTENTS).map_err(|e| {
                        PuxianError::Io {
                            source: e,
                            context: format!("Failed to write intents.toml: {:?}", intents_path),
                        }
                    })?;
                    println!("✓ Intent patterns written to: {}", intents_path.display());
                    println!("  Set classifier.patterns_file to use a customised copy");
                }
            }
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, corpus: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'puxian config init' to create one."
        );
    }

    let mut config = Config::load_or_default(&path)?;
    if let Some(corpus) = corpus {
        config.corpus.path = corpus;
    }
    Ok(config)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| PuxianError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })
}
