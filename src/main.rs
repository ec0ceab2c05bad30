//! Main entry point for the urlzip CLI application.
//!
//! Collects sources from the command line and an optional manifest, then
//! either writes the archive to a file or streams it to stdout.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::time::Duration;

use urlzip::logging::init_logging;
use urlzip::{Assembler, Cli, HttpFetcher, HttpFetcherConfig, SchemeFetcher, SourceDescriptor};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.quiet);

    let sources = collect_sources(&cli)?;
    if sources.is_empty() {
        bail!("no sources given; pass LOCATIONS or --manifest");
    }

    let http = HttpFetcher::with_config(&HttpFetcherConfig {
        timeout: Duration::from_secs(cli.timeout),
        ..HttpFetcherConfig::default()
    })?;
    let assembler = Assembler::builder()
        .fetcher(SchemeFetcher::new(http))
        .compression(cli.compression())
        .debug(cli.debug)
        .build()?;

    match &cli.output {
        Some(path) => {
            let mut file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("cannot create {}", path.display()))?;
            assembler.write_to(&sources, &mut file).await?;
            file.sync_all().await?;
            tracing::info!(entries = sources.len(), output = %path.display(), "archive written");
        }
        None => {
            // Stream through the bridge so stdout starts receiving bytes
            // while later sources are still being fetched
            let mut reader = assembler.stream(sources).into_async_read();
            let mut stdout = tokio::io::stdout();
            tokio::io::copy(&mut reader, &mut stdout).await?;
            tokio::io::AsyncWriteExt::flush(&mut stdout).await?;
        }
    }

    Ok(())
}

/// Positional locations first, then manifest entries, in their given order
fn collect_sources(cli: &Cli) -> Result<Vec<SourceDescriptor>> {
    let mut sources = cli
        .locations
        .iter()
        .map(|location| SourceDescriptor::new(location.as_str()))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(path) = &cli.manifest {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read manifest {}", path.display()))?;
        let listed: Vec<SourceDescriptor> = serde_json::from_str(&text)
            .with_context(|| format!("invalid manifest {}", path.display()))?;
        sources.extend(listed);
    }

    Ok(sources)
}
