//! DNS seed resolution. An external collaborator, not part of the crawl
//! core: it turns a list of hostnames into a list of endpoints and hands
//! them to the crawler as ordinary seeds. Duplicates across hosts are
//! expected and fine — the queue dedups downstream.

use tokio::net::lookup_host;
use tracing::warn;

use crate::addr_key::Endpoint;
use crate::config::DEFAULT_DNS_SEEDS;

/// Resolves each of `hosts` (plain hostnames, no port) against `port`,
/// concurrently, via `tokio::net::lookup_host`. A host that fails to
/// resolve is logged and skipped rather than failing the whole crawl.
pub async fn resolve_dns_seeds(hosts: &[String], port: u16) -> Vec<Endpoint> {
    let tasks: Vec<_> = hosts
        .iter()
        .cloned()
        .map(|host| {
            tokio::spawn(async move {
                let query = format!("{}:{}", host, port);
                match lookup_host(query).await {
                    Ok(addrs) => addrs.map(|a| Endpoint::new(a.to_string())).collect::<Vec<_>>(),
                    Err(e) => {
                        warn!(host = %host, error = %e, "dns seed lookup failed");
                        Vec::new()
                    }
                }
            })
        })
        .collect();

    let mut endpoints = Vec::new();
    for task in tasks {
        if let Ok(found) = task.await {
            endpoints.extend(found);
        }
    }
    endpoints
}

/// The crawler's built-in seed list, used when the CLI is given no
/// `--seed` overrides.
pub fn default_seed_hosts() -> Vec<String> {
    DEFAULT_DNS_SEEDS.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unresolvable_host_is_skipped_not_fatal() {
        let hosts = vec!["this-host-does-not-exist.invalid".to_string()];
        let endpoints = resolve_dns_seeds(&hosts, 8333).await;
        assert!(endpoints.is_empty());
    }

    #[test]
    fn default_seed_hosts_matches_the_documented_list() {
        assert_eq!(default_seed_hosts().len(), 6);
    }
}
