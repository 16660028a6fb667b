//! Classification of playback URLs served by a torrent streaming cache.
//!
//! A negotiable URL has the shape `scheme://host[:port]/stream/<id>?<query>`
//! and carries a `link` parameter identifying the torrent on the server.

use std::sync::LazyLock;

use regex::Regex;

static STREAM_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(https?://.+?)(/stream/[^?]+)\?(.+)$").unwrap());

/// Control parameters the cache server interprets per request. They are
/// stripped so the canonical URL can be re-issued with a different one.
const CONTROL_PARAMS: &[&str] = &["play", "preload", "stat"];

/// A playback URL taken apart into its negotiation-ready form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamUrl {
    /// Scheme and host prefix of the cache server, e.g. "http://127.0.0.1:8090"
    pub base: String,
    /// Stream resource path, e.g. "/stream/movie.mkv"
    pub path: String,
    /// Identifying hash of the torrent on the server
    pub link: String,
    /// Remaining query pairs in first-seen order. `None` marks a parameter
    /// present without a value.
    params: Vec<(String, Option<String>)>,
}

impl StreamUrl {
    /// URL with control parameters removed, suitable for re-issuing with a
    /// different control parameter appended.
    pub fn canonical_url(&self) -> String {
        let query = self
            .params
            .iter()
            .map(|(name, value)| match value {
                Some(value) => format!("{name}={value}"),
                None => name.clone(),
            })
            .collect::<Vec<_>>()
            .join("&");

        format!("{}{}?{}", self.base, self.path, query)
    }

    /// URL of the preload trigger request
    pub fn trigger_url(&self) -> String {
        format!("{}&preload", self.canonical_url())
    }

    /// URL of the cache statistics endpoint
    pub fn cache_url(&self) -> String {
        format!("{}/cache", self.base)
    }

    /// Look up a retained query parameter
    pub fn param(&self, name: &str) -> Option<Option<&str>> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_deref())
    }
}

/// Determine whether a playback URL targets a torrent streaming cache server
/// and take it apart. Returns `None` for URLs that do not match the expected
/// shape or lack the identifying `link` parameter; such requests go straight
/// to the player.
pub fn classify(url: &str) -> Option<StreamUrl> {
    let caps = STREAM_URL_REGEX.captures(url)?;

    let base = caps[1].to_string();
    let path = caps[2].to_string();

    let mut params = Vec::new();
    for pair in caps[3].split('&') {
        let (name, value) = match pair.split_once('=') {
            Some((name, "")) => (name, None),
            Some((name, value)) => (name, Some(value.to_string())),
            None => (pair, None),
        };
        if CONTROL_PARAMS.contains(&name) {
            continue;
        }
        params.push((name.to_string(), value));
    }

    // The server cannot identify the torrent without the link hash
    let link = params
        .iter()
        .find(|(name, _)| name == "link")
        .and_then(|(_, value)| value.clone())?;

    Some(StreamUrl {
        base,
        path,
        link,
        params,
    })
}
