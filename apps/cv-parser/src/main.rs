use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cv_parser::cli::{Cli, Command, ParseArgs};
use cv_parser::{list_available_providers, Config, CvParser, DocumentSource, ParseOptions, ProviderKind, Schema};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (reads .env when present)
    let config = Config::from_env()?;

    // Initialize structured logging; stdout is reserved for JSON output
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting cv-parser v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Providers => print_providers(&config),
        Command::Parse(args) => run_parse(config, args).await,
    }
}

fn print_providers(config: &Config) -> Result<()> {
    let available = list_available_providers();
    let rows: Vec<_> = ProviderKind::ALL
        .iter()
        .map(|kind| {
            json!({
                "provider": kind,
                "available": available.contains(kind),
                "keyConfigured": config.api_key(*kind).is_some(),
                "models": kind.default_models(),
                "default": *kind == config.provider,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

async fn run_parse(config: Config, args: ParseArgs) -> Result<()> {
    let schema = match &args.schema_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read schema file {}", path.display()))?;
            Schema::from_json_str(&raw)
                .with_context(|| format!("invalid schema file {}", path.display()))?
        }
        None => args.schema.schema().clone(),
    };

    let parser = CvParser::new(config, args.to_options())?.with_schema(schema);
    let sources: Vec<DocumentSource> = args.files.iter().map(DocumentSource::path).collect();

    let report = parser
        .parse_batch(&sources, &ParseOptions::default())
        .await;
    let failed = report.summary.failed;

    if let [item] = report.items.as_slice() {
        match (&item.result, &item.error) {
            (Some(result), _) => print_json(result, args.pretty)?,
            (None, Some(error)) => bail!("{}: {}", item.source, error.message),
            (None, None) => bail!("{}: no result", item.source),
        }
    } else {
        print_json(&report, args.pretty)?;
        if failed > 0 {
            bail!("{failed} of {} documents failed", report.summary.total);
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}
