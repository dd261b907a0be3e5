mod config;

use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use entries::{ContentQuery, EntriesError, EntryService, ErrorEnvelope};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(version, about = "Serves CMS entries from a replica, a result cache and the CMS API")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the content-entries HTTP gateway and its admin listener
    Gateway(ConfigArgs),
    /// Look up content once and print the JSON payload
    Resolve(ResolveArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long)]
    config_file: PathBuf,
}

#[derive(Args)]
struct ResolveArgs {
    #[command(flatten)]
    config: ConfigArgs,
    #[arg(long, default_value = "")]
    content_id: String,
    #[arg(long, default_value = "")]
    content_type: String,
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(i64).range(0..=10))]
    include: i64,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid log level: {0}")]
    LogLevel(String),
    #[error("could not set up statsd: {0}")]
    Metrics(String),
    #[error(transparent)]
    Entries(#[from] EntriesError),
    #[error(transparent)]
    Gateway(#[from] gateway::GatewayError),
    #[error("could not encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("contentgate: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_file = match &cli.command {
        CliCommand::Gateway(args) => &args.config_file,
        CliCommand::Resolve(args) => &args.config.config_file,
    };
    let config = Config::from_file(config_file)?;

    // Held until exit so buffered events are flushed
    let _sentry = init_logging(&config.logging)?;
    if let Some(metrics) = &config.metrics {
        init_metrics(metrics)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let entries = EntryService::from_config(&config.entries)?;
        tracing::info!(
            replica = entries.replica_enabled(),
            caching = entries.caching_enabled(),
            fallback = entries.fallback_enabled(),
            "Entries service configured"
        );

        match cli.command {
            CliCommand::Gateway(_) => gateway::run(config.gateway, entries).await?,
            CliCommand::Resolve(args) => resolve(&entries, args).await?,
        }
        Ok::<(), CliError>(())
    })
}

async fn resolve(entries: &EntryService, args: ResolveArgs) -> Result<(), CliError> {
    let query = ContentQuery::from_params(&args.content_id, &args.content_type);

    match entries.query(&query, args.include).await {
        Ok(payload) => {
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
        Err(err) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&ErrorEnvelope::new(err.to_string()))?
            );
            Err(err.into())
        }
    }
}

fn init_logging(config: &LoggingConfig) -> Result<Option<sentry::ClientInitGuard>, CliError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|_| CliError::LogLevel(config.level.clone()))?,
    };

    let sentry = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    let sentry_layer = sentry
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(sentry_layer)
        .init();

    Ok(sentry)
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some(config.prefix.as_str()))
        .map_err(|err| CliError::Metrics(err.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|err| CliError::Metrics(err.to_string()))?;

    shared::metrics_defs::describe_all(entries::metrics_defs::ALL_METRICS);
    Ok(())
}
