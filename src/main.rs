use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use eol_integrator::{
    config::Config,
    credentials::{
        CredentialStore, SledCredentialStore, RABBIT_CREDENTIAL_KEYS, RABBIT_PASSWORD,
    },
    publisher::{init_publisher_metrics, render_metrics, DataCategory, DeliveryReport, DeliveryService},
    sources::{EolSource, JsonFileSource, RunMode, ScraperController, SourceCatalog},
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "eol-integrator")]
#[command(about = "EOL metadata integrator", version, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run sources and publish their feeds
    Scrape {
        /// Comma separated source names (all when omitted)
        #[arg(short, long, value_delimiter = ',')]
        sources: Vec<String>,

        /// Write raw rows to files instead of publishing
        #[arg(short, long)]
        test: bool,
    },

    /// Publish rows from a JSON array file
    Publish {
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,

        #[arg(short, long, default_value = "software")]
        category: DataCategory,
    },

    /// Store broker credentials
    #[command(name = "setup-rabbit")]
    SetupRabbit {
        /// Only set this key (e.g. RABBIT_HOST)
        #[arg(short, long)]
        property: Option<String>,
    },

    /// Remove every stored credential
    #[command(name = "clear-credentials")]
    ClearCredentials,

    /// List available sources
    Sources,

    /// Print publisher metrics in the Prometheus text format
    Metrics,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });

    init_tracing(&config, cli.debug);

    if config.observability.prometheus_enabled {
        init_publisher_metrics();
    }

    match cli.command {
        Commands::Scrape { sources, test } => {
            let catalog = SourceCatalog::builtin(&config.sources)?;
            let mut controller = ScraperController::new(catalog, config.sources.output_dir.clone());

            let mode = if test {
                RunMode::Test
            } else {
                let credentials = open_credentials(&config)?;
                controller =
                    controller.with_delivery(Arc::new(DeliveryService::from_config(&config, credentials)?));
                RunMode::Publish
            };

            for run in controller.run(&sources, mode).await? {
                match (&run.delivery, &run.output_file) {
                    (Some(report), _) => print_report(&run.name, report),
                    (None, Some(path)) => println!("{}: {} rows written to {}", run.name, run.rows, path.display()),
                    (None, None) => println!("{}: {} rows", run.name, run.rows),
                }
            }
        }

        Commands::Publish { file, category } => {
            let source = JsonFileSource::new("file", &file);
            let rows = source
                .collect()
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let credentials = open_credentials(&config)?;
            let service = DeliveryService::from_config(&config, credentials)?;
            let data = serde_json::Value::Array(rows.into_iter().map(serde_json::Value::Object).collect());

            let report = service.publish_scraper_data(data, category).await?;
            print_report(&file.display().to_string(), &report);
        }

        Commands::SetupRabbit { property } => {
            let store = open_credentials(&config)?;
            let keys: Vec<&str> = match property.as_deref() {
                Some(key) => match RABBIT_CREDENTIAL_KEYS.iter().find(|k| k.eq_ignore_ascii_case(key)) {
                    Some(key) => vec![*key],
                    None => bail!(
                        "Unknown property '{}', expected one of {}",
                        key,
                        RABBIT_CREDENTIAL_KEYS.join(", ")
                    ),
                },
                None => RABBIT_CREDENTIAL_KEYS.to_vec(),
            };

            for key in keys {
                let value = prompt_value(key)?;
                store.set(key, &value, None).await?;
            }
            println!("Broker credentials saved");
        }

        Commands::ClearCredentials => {
            open_credentials(&config)?.clear().await?;
            println!("Credentials cleared");
        }

        Commands::Sources => {
            for name in SourceCatalog::builtin(&config.sources)?.names() {
                println!("{}", name);
            }
        }

        Commands::Metrics => {
            print!("{}", render_metrics());
        }
    }

    Ok(())
}

fn init_tracing(config: &Config, debug: bool) {
    let default_filter = if debug {
        "eol_integrator=debug".to_string()
    } else {
        format!("eol_integrator={}", config.observability.log_level)
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn open_credentials(config: &Config) -> anyhow::Result<Arc<dyn CredentialStore>> {
    let dir = config.credentials.resolved_cache_dir()?;
    let store = SledCredentialStore::new(&dir)
        .with_context(|| format!("Failed to open credential store at {}", dir.display()))?;
    Ok(Arc::new(store))
}

fn prompt_value(key: &str) -> anyhow::Result<String> {
    let value = if key == RABBIT_PASSWORD {
        rpassword::prompt_password(format!("{}: ", key))?
    } else {
        print!("{}: ", key);
        io::stdout().flush()?;
        let mut value = String::new();
        io::stdin().read_line(&mut value)?;
        value.trim().to_string()
    };

    if value.is_empty() {
        bail!("{} is required", key);
    }
    Ok(value)
}

fn print_report(name: &str, report: &DeliveryReport) {
    if report.is_fully_delivered() {
        println!("{}: delivered (request {}, {} sweeps)", name, report.request_id, report.sweeps);
    } else {
        println!(
            "{}: {} message(s) escalated after retries (request {})",
            name,
            report.escalated.len(),
            report.request_id
        );
    }
}
