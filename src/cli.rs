//! Command-line surface, mirroring the original `btc-crawl`'s flags.
//! Building a [`CrawlerConfig`] is the only thing this module does; the
//! core never touches `clap` or argument parsing.

use std::time::Duration;

use clap::Parser;

use crate::config::{CrawlerConfig, DEFAULT_CONCURRENCY, DEFAULT_CONNECT_TIMEOUT, DEFAULT_OUTPUT, DEFAULT_PEER_AGE, DEFAULT_USER_AGENT};
use crate::wire::types::DEFAULT_PORT;

#[derive(Parser, Debug)]
#[command(name = "btc-crawl", version, about = "Crawl the Bitcoin P2P network and report reachable nodes")]
pub struct Cli {
    /// Increase logging verbosity (repeatable: -v info, -vv debug).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output file, or `-` for stdout.
    #[arg(short = 'o', long = "output", default_value = DEFAULT_OUTPUT)]
    pub output: String,

    /// Seed host:port to crawl from (repeatable). Overrides the built-in
    /// DNS seed list entirely when given.
    #[arg(short = 's', long = "seed")]
    pub seed: Vec<String>,

    /// Maximum number of peer sessions running at once.
    #[arg(short = 'c', long = "concurrency", default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Per-connection dial timeout, in seconds.
    #[arg(long = "connect-timeout", default_value_t = DEFAULT_CONNECT_TIMEOUT.as_secs())]
    pub connect_timeout_secs: u64,

    /// User agent string to advertise in our `version` message.
    #[arg(short = 'u', long = "user-agent", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Ignore peer addresses older than this, in seconds.
    #[arg(long = "peer-age", default_value_t = DEFAULT_PEER_AGE.as_secs())]
    pub peer_age_secs: u64,

    /// Stop after this many results have been written (0 = unbounded).
    #[arg(long = "stop-after", default_value_t = 0)]
    pub stop_after: usize,
}

impl Cli {
    pub fn to_config(&self) -> CrawlerConfig {
        CrawlerConfig {
            user_agent: self.user_agent.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: CrawlerConfig::default().read_timeout,
            peer_age_cutoff: Duration::from_secs(self.peer_age_secs),
            concurrency: self.concurrency.max(1),
            seed_port: DEFAULT_PORT,
            stop_after: self.stop_after,
        }
    }

    /// Verbosity ladder: 0 -> warn, 1 -> info, 2+ -> debug.
    pub fn default_log_directive(&self) -> &'static str {
        match self.verbose {
            0 => "btc_crawl=warn",
            1 => "btc_crawl=info",
            _ => "btc_crawl=debug",
        }
    }
}
