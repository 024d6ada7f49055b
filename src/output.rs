//! Streams crawl results out as a JSON array, to a file or to stdout.
//! Written incrementally (`[`, comma-joined objects, `]`) rather than
//! buffered, so a long crawl doesn't hold every result in memory.

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_stream::StreamExt;

use crate::crawler::CrawlResult;
use crate::shutdown::ShutdownHandle;
use crate::wire::NetAddress;

#[derive(Debug, Serialize)]
struct ResultRecord {
    #[serde(rename = "Node")]
    node: NodeRecord,
    #[serde(rename = "Peers")]
    peers: Vec<PeerRecord>,
}

#[derive(Debug, Serialize)]
struct NodeRecord {
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "UserAgent")]
    user_agent: String,
    #[serde(rename = "ProtocolVersion")]
    protocol_version: i32,
}

#[derive(Debug, Serialize)]
struct PeerRecord {
    #[serde(rename = "IP")]
    ip: String,
    #[serde(rename = "Port")]
    port: u16,
    #[serde(rename = "Services")]
    services: u64,
    #[serde(rename = "Timestamp")]
    timestamp: DateTime<Utc>,
}

impl From<&CrawlResult> for ResultRecord {
    fn from(result: &CrawlResult) -> Self {
        ResultRecord {
            node: NodeRecord {
                address: result.node.endpoint.as_str().to_string(),
                user_agent: result.node.user_agent.clone(),
                protocol_version: result.node.protocol_version,
            },
            peers: result.peers.iter().map(PeerRecord::from).collect(),
        }
    }
}

impl From<&NetAddress> for PeerRecord {
    fn from(addr: &NetAddress) -> Self {
        PeerRecord {
            ip: addr.to_ip_addr().to_string(),
            port: addr.port,
            services: addr.services,
            timestamp: DateTime::from_timestamp(addr.timestamp as i64, 0)
                .unwrap_or_else(|| DateTime::from_timestamp(0, 0).expect("epoch is representable")),
        }
    }
}

/// Drains `stream`, writing each result as it arrives. On a write error,
/// triggers `shutdown` and stops writing further results, but keeps
/// draining the stream (so `complete()` still fires for in-flight work)
/// and always emits the closing `]` so whatever was written stays valid
/// JSON. If `stop_after` is nonzero, triggers `shutdown` exactly once,
/// right after the `stop_after`-th result has been written. Returns the
/// number of results actually written.
pub async fn write_results<W, S>(
    mut writer: W,
    mut stream: S,
    shutdown: Option<&ShutdownHandle>,
    stop_after: usize,
) -> io::Result<usize>
where
    W: Write,
    S: tokio_stream::Stream<Item = CrawlResult> + Unpin,
{
    writer.write_all(b"[")?;
    let mut written = 0usize;
    let mut first = true;
    let mut sink_failed = false;

    while let Some(result) = stream.next().await {
        if sink_failed {
            continue;
        }

        let record = ResultRecord::from(&result);
        let json = match serde_json::to_string(&record) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let chunk = if first { json } else { format!(",{}", json) };

        match writer.write_all(chunk.as_bytes()) {
            Ok(()) => {
                first = false;
                written += 1;
                if stop_after > 0 && written == stop_after {
                    if let Some(handle) = shutdown {
                        handle.trigger().await;
                    }
                }
            }
            Err(_) => {
                sink_failed = true;
                if let Some(handle) = shutdown {
                    handle.trigger().await;
                }
            }
        }
    }

    writer.write_all(b"]")?;
    writer.flush()?;
    Ok(written)
}
