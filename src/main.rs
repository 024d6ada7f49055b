//! `btc-crawl`: crawl the Bitcoin P2P network from a set of seeds and
//! stream a JSON report of every node reached and the addresses it gave
//! back. Everything here is ambient wiring: parse flags, set up logging,
//! resolve seeds, drive the crawler, write output. The crawl itself lives
//! in [`btc_crawl::crawler`].

use std::fs::File;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use btc_crawl::addr_key::Endpoint;
use btc_crawl::cli::Cli;
use btc_crawl::crawler::Crawler;
use btc_crawl::error::CrawlerError;
use btc_crawl::output::write_results;
use btc_crawl::seed::{default_seed_hosts, resolve_dns_seeds};
use btc_crawl::shutdown::{spawn_interrupt_listener, ShutdownHandle};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.default_log_directive())),
        )
        .init();

    match run(cli).await {
        Ok(n) => {
            info!(results = n, "crawl finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// The fallible core of `main`, split out so every fatal condition
/// (nothing to crawl, output writer failure) is a real `CrawlerError`
/// instead of an ad hoc `eprintln!`/early-return pair.
async fn run(cli: Cli) -> Result<usize, CrawlerError> {
    let seeds = resolve_seeds(&cli).await;
    if seeds.is_empty() {
        return Err(CrawlerError::NoSeeds);
    }

    let config = cli.to_config();
    let crawler = Arc::new(Crawler::new(config.clone()));
    let shutdown_handle = ShutdownHandle::new(crawler.clone());
    spawn_interrupt_listener(shutdown_handle.clone());

    info!(
        seeds = seeds.len(),
        concurrency = config.concurrency,
        output = %cli.output,
        "starting crawl"
    );

    let results = crawler.run(seeds);

    let written = match cli.output.as_str() {
        "-" => write_results(io::stdout().lock(), results, Some(&shutdown_handle), cli.stop_after).await,
        path => {
            let file = File::create(path)
                .map_err(|e| CrawlerError::Output(io::Error::new(e.kind(), format!("failed to open {path}: {e}"))))?;
            write_results(file, results, Some(&shutdown_handle), cli.stop_after).await
        }
    };

    Ok(written.map_err(CrawlerError::Output)?)
}

/// `--seed` overrides the built-in DNS seed list entirely; otherwise the
/// default hostnames are resolved concurrently.
async fn resolve_seeds(cli: &Cli) -> Vec<Endpoint> {
    if !cli.seed.is_empty() {
        return cli.seed.iter().cloned().map(Endpoint::new).collect();
    }
    let hosts = default_seed_hosts();
    resolve_dns_seeds(&hosts, btc_crawl::wire::DEFAULT_PORT).await
}
