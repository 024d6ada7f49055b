//! Tunables threaded through from the CLI into the crawler core. The core
//! never parses flags itself — [`crate::cli`] builds one of these and hands
//! it down.

use std::time::Duration;

use crate::wire::types::DEFAULT_PORT;

pub const DEFAULT_USER_AGENT: &str = "/btc-crawl:0.1.1/";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PEER_AGE: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_OUTPUT: &str = "btc-crawl.json";

pub const DEFAULT_DNS_SEEDS: &[&str] = &[
    "seed.bitcoin.sipa.be",
    "dnsseed.bluematt.me",
    "dnsseed.bitcoin.dashjr.org",
    "seed.bitcoinstats.com",
    "seed.bitnodes.io",
    "bitseed.xf2.org",
];

#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub peer_age_cutoff: Duration,
    pub concurrency: usize,
    pub seed_port: u16,
    pub stop_after: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            peer_age_cutoff: DEFAULT_PEER_AGE,
            concurrency: DEFAULT_CONCURRENCY,
            seed_port: DEFAULT_PORT,
            stop_after: 0,
        }
    }
}
