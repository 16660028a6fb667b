//! Shared fixtures for session and interceptor tests: a scriptable
//! transport and recording presenter/player doubles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::client::CacheTransport;
use crate::error::PreloadError;
use crate::player::{PlaybackRequest, Player};
use crate::presenter::{PresenterFactory, ProgressPresenter};
use crate::session::SessionActions;
use crate::stats::{ProgressSnapshot, TorrentStats};
use crate::url::{StreamUrl, classify};

pub const HASH: &str = "08ada5a7a6183aae1e09d831df6748d566095a10";

pub fn stream_request_url() -> String {
    format!("http://127.0.0.1:8090/stream/movie.mkv?link={HASH}&index=1&play")
}

pub fn stream_url() -> StreamUrl {
    classify(&stream_request_url()).unwrap()
}

pub fn playback_request() -> PlaybackRequest {
    PlaybackRequest {
        url: stream_request_url(),
        extras: Some(serde_json::json!({"title": "movie", "timeline": 42})),
    }
}

pub enum TriggerScript {
    Resolve,
    Hang,
}

pub enum StatsScript {
    Hang,
    NoTorrent,
    Report(TorrentStats),
}

/// Sets its flag when dropped, which is how an aborted request is observed.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Transport double following a fixed script per request kind.
pub struct ScriptedTransport {
    trigger: TriggerScript,
    stats: StatsScript,
    pub trigger_urls: Mutex<Vec<String>>,
    pub stats_requests: Mutex<Vec<(String, String)>>,
    pub trigger_aborted: Arc<AtomicBool>,
    pub stats_aborted: Arc<AtomicBool>,
}

impl ScriptedTransport {
    pub fn new(trigger: TriggerScript, stats: StatsScript) -> Arc<Self> {
        Arc::new(Self {
            trigger,
            stats,
            trigger_urls: Mutex::new(Vec::new()),
            stats_requests: Mutex::new(Vec::new()),
            trigger_aborted: Arc::new(AtomicBool::new(false)),
            stats_aborted: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[async_trait]
impl CacheTransport for ScriptedTransport {
    async fn trigger(&self, url: &str) -> Result<(), PreloadError> {
        self.trigger_urls.lock().push(url.to_string());
        match self.trigger {
            TriggerScript::Resolve => Ok(()),
            TriggerScript::Hang => {
                let _guard = DropFlag(Arc::clone(&self.trigger_aborted));
                std::future::pending().await
            }
        }
    }

    async fn fetch_stats(
        &self,
        cache_url: &str,
        hash: &str,
    ) -> Result<Option<TorrentStats>, PreloadError> {
        self.stats_requests
            .lock()
            .push((cache_url.to_string(), hash.to_string()));
        match &self.stats {
            StatsScript::Hang => {
                let _guard = DropFlag(Arc::clone(&self.stats_aborted));
                std::future::pending().await
            }
            StatsScript::NoTorrent => Ok(None),
            StatsScript::Report(stats) => Ok(Some(stats.clone())),
        }
    }
}

#[derive(Default)]
pub struct RecordingPresenter {
    pub renders: Mutex<Vec<ProgressSnapshot>>,
    pub actions: Mutex<Option<SessionActions>>,
    disposed: AtomicUsize,
}

impl RecordingPresenter {
    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn bound_actions(&self) -> SessionActions {
        self.actions.lock().clone().expect("actions not bound")
    }
}

impl ProgressPresenter for RecordingPresenter {
    fn render(&self, snapshot: &ProgressSnapshot) {
        self.renders.lock().push(snapshot.clone());
    }

    fn bind_actions(&self, actions: SessionActions) {
        *self.actions.lock() = Some(actions);
    }

    fn dispose(&self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Opens a fresh recording presenter per negotiation and keeps them all.
#[derive(Default)]
pub struct RecordingFactory {
    pub opened: Mutex<Vec<Arc<RecordingPresenter>>>,
}

impl PresenterFactory for RecordingFactory {
    fn open(&self) -> Arc<dyn ProgressPresenter> {
        let presenter = Arc::new(RecordingPresenter::default());
        self.opened.lock().push(Arc::clone(&presenter));
        presenter
    }
}

#[derive(Default)]
pub struct RecordingPlayer {
    pub plays: Mutex<Vec<PlaybackRequest>>,
}

#[async_trait]
impl Player for RecordingPlayer {
    async fn play(&self, request: PlaybackRequest) {
        self.plays.lock().push(request);
    }
}
