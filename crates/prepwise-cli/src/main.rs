use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use prepwise_core::config::Config;
use prepwise_core::store::open_store;
use prepwise_gateway::AppState;
use prepwise_gateway::generate::{GenerateRequest, create_interview};
use prepwise_providers::build_default_provider;

#[derive(Parser)]
#[command(
    name = "prepwise",
    about = "AI mock-interview backend: question generation, voice calls, and feedback",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Port to listen on (default: 3000)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Generate and store an interview without going through the gateway
    Generate {
        /// Job role, e.g. "Frontend Developer"
        #[arg(long)]
        role: String,

        /// Experience level, e.g. "Junior"
        #[arg(long)]
        level: String,

        /// Question focus: technical, behavioural, or mixed
        #[arg(long = "type")]
        interview_type: String,

        /// Comma-separated tech stack
        #[arg(long)]
        techstack: String,

        /// Number of questions
        #[arg(long, default_value_t = 5)]
        amount: u64,

        /// Owner of the interview
        #[arg(long)]
        userid: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show system status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value
    Get { key: String },
    /// Set a config value (parsed as JSON, falling back to a string)
    Set { key: String, value: String },
    /// Check the configuration for problems
    Validate,
}

/// Install the tracing subscriber described by the `logging` config section.
fn init_logging(config: &Config, verbose: bool) {
    let logging = config.logging.clone().unwrap_or_default();
    let level = if verbose {
        "debug".to_string()
    } else {
        logging.level.clone().unwrap_or_else(|| "info".to_string())
    };

    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));
    for directive in &logging.filters {
        match directive.parse() {
            Ok(d) => filter = filter.add_directive(d),
            Err(e) => eprintln!("Ignoring log filter '{directive}': {e}"),
        }
    }

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (logging.format.as_str(), logging.output.as_str()) {
        ("json", "stdout") => builder.json().with_writer(std::io::stdout).init(),
        ("json", _) => builder.json().with_writer(std::io::stderr).init(),
        (_, "stdout") => builder.with_writer(std::io::stdout).init(),
        _ => builder.with_writer(std::io::stderr).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_dir);

    let config = Config::load(&config_path)?;
    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or_else(|| config.gateway_port());

            let (warnings, errors) = config.validate();
            for warning in &warnings {
                tracing::warn!("{warning}");
            }
            if !errors.is_empty() {
                for error in &errors {
                    tracing::error!("{error}");
                }
                anyhow::bail!("Invalid configuration ({} errors)", errors.len());
            }

            let store = open_store(&config)?;
            let provider = build_default_provider(&config)?;
            tracing::info!(
                provider = provider.provider.id(),
                model = %config.default_model(),
                store = ?config.store_backend(),
                "Starting Prepwise gateway on port {port}"
            );

            let state = Arc::new(AppState::new(Arc::new(config), store, provider));
            prepwise_gateway::start_gateway(state, port).await?;
        }
        Commands::Generate {
            role,
            level,
            interview_type,
            techstack,
            amount,
            userid,
        } => {
            let request = GenerateRequest {
                interview_type: Some(json!(interview_type)),
                role: Some(json!(role)),
                level: Some(json!(level)),
                techstack: Some(json!(techstack)),
                amount: Some(json!(amount)),
                userid: Some(json!(userid)),
            };
            let params = request.validate()?;

            let store = open_store(&config)?;
            let provider = build_default_provider(&config)?;
            let interview_id =
                create_interview(&config, &provider, store.as_ref(), &params).await?;
            println!("{interview_id}");
        }
        Commands::Status => {
            println!("Prepwise v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Gateway port: {}", config.gateway_port());
            println!("Model: {}", config.default_model());
            println!("Store: {:?}", config.store_backend());
            println!(
                "Voice workflow: {}",
                if config.workflow_id().is_some() { "configured" } else { "not configured" }
            );

            let url = format!("http://127.0.0.1:{}/health", config.gateway_port());
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()?;
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let body: serde_json::Value = resp.json().await.unwrap_or_default();
                    println!("Status: running ({} active calls)", body["calls"]);
                }
                _ => println!("Status: not running"),
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("No config value at '{key}'"),
            },
            ConfigAction::Set { key, value } => {
                let value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
                let mut config = config;
                config.set_path(&key, value)?;
                config.save(&config_path)?;
                println!("Updated {key} in {}", config_path.display());
            }
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for warning in &warnings {
                    println!("warning: {warning}");
                }
                for error in &errors {
                    println!("error: {error}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} configuration error(s)", errors.len());
                }
                println!("Configuration OK");
            }
        },
    }

    Ok(())
}
