//! Wire models for the cache server's statistics API and the progress
//! snapshot derived from them.

use serde::{Deserialize, Serialize};

/// Body of the statistics request, `{"action":"get","hash":"..."}`
#[derive(Debug, Serialize)]
pub struct CacheRequest<'a> {
    pub action: &'a str,
    pub hash: &'a str,
}

impl<'a> CacheRequest<'a> {
    pub fn get(hash: &'a str) -> Self {
        Self {
            action: "get",
            hash,
        }
    }
}

/// Statistics response envelope. A response without a `Torrent` payload is
/// not an error; it simply carries no update.
#[derive(Debug, Deserialize)]
pub struct CacheResponse {
    #[serde(rename = "Torrent")]
    pub torrent: Option<TorrentStats>,
}

/// Raw buffering statistics as reported by the server
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TorrentStats {
    #[serde(default)]
    pub active_peers: u64,
    #[serde(default)]
    pub preloaded_bytes: u64,
    #[serde(default)]
    pub preload_size: u64,
    #[serde(default)]
    pub download_speed: f64,
}

impl TorrentStats {
    /// Derive the snapshot shown to the user.
    ///
    /// A zero `preload_size` is substituted with 1, so the percentage then
    /// reflects the raw byte count and may exceed 100.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let preload_size = if self.preload_size == 0 {
            1
        } else {
            self.preload_size
        };

        ProgressSnapshot {
            active_peers: self.active_peers,
            downloaded_percent: self.preloaded_bytes * 100 / preload_size,
            download_speed_bps: self.download_speed * 8.0,
        }
    }
}

/// What the progress dialog renders, replaced wholesale on each update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    /// Number of connected peers
    pub active_peers: u64,
    /// Preloaded share of the requested buffer, floor of a percentage
    pub downloaded_percent: u64,
    /// Download speed in bits per second
    pub download_speed_bps: f64,
}

/// Convert a bits-per-second rate to a human-readable format
pub fn format_speed(bits_per_second: f64) -> String {
    const KBIT: f64 = 1024.0;
    const MBIT: f64 = KBIT * 1024.0;
    const GBIT: f64 = MBIT * 1024.0;

    if bits_per_second >= GBIT {
        format!("{:.2} Gbit/s", bits_per_second / GBIT)
    } else if bits_per_second >= MBIT {
        format!("{:.2} Mbit/s", bits_per_second / MBIT)
    } else if bits_per_second >= KBIT {
        format!("{:.2} Kbit/s", bits_per_second / KBIT)
    } else {
        format!("{bits_per_second:.0} bit/s")
    }
}
