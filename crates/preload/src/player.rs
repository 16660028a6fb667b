//! Playback interception.
//!
//! [`InterceptingPlayer`] decorates the host's player: requests aimed at
//! the configured cache server get a preload negotiation first, everything
//! else passes straight through. [`PlayerSlot`] is the registration point
//! that swaps the decorator in and out of the host's playback entry.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::client::CacheTransport;
use crate::config::PreloadConfig;
use crate::presenter::PresenterFactory;
use crate::session::{PreloadSession, SessionHandle};
use crate::url::classify;

/// A playback request as the host hands it over. `extras` is an opaque
/// host payload carried through to the real player untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    pub url: String,
    pub extras: Option<serde_json::Value>,
}

/// The playback entry point
#[async_trait]
pub trait Player: Send + Sync {
    async fn play(&self, request: PlaybackRequest);
}

/// Decorator that runs a preload negotiation before delegating to the
/// wrapped player, when the request targets the configured cache server.
pub struct InterceptingPlayer {
    inner: Arc<dyn Player>,
    config: PreloadConfig,
    transport: Arc<dyn CacheTransport>,
    presenters: Arc<dyn PresenterFactory>,
    /// Most recently started negotiation
    session: Mutex<Option<SessionHandle>>,
}

impl InterceptingPlayer {
    pub fn new(
        inner: Arc<dyn Player>,
        config: PreloadConfig,
        transport: Arc<dyn CacheTransport>,
        presenters: Arc<dyn PresenterFactory>,
    ) -> Self {
        Self {
            inner,
            config,
            transport,
            presenters,
            session: Mutex::new(None),
        }
    }

    /// The wrapped player
    pub fn inner(&self) -> Arc<dyn Player> {
        Arc::clone(&self.inner)
    }

    /// Hand over ownership of the most recently started negotiation
    pub fn take_session(&self) -> Option<SessionHandle> {
        self.session.lock().take()
    }

    /// Cancel whatever negotiation is in flight
    pub fn shutdown(&self) {
        if let Some(session) = self.session.lock().take() {
            session.cancel();
        }
    }

    fn should_negotiate(&self, url: &str) -> bool {
        if !self.config.enabled {
            return false;
        }
        let address = self.config.server_address();
        !address.is_empty() && url.contains(address)
    }
}

#[async_trait]
impl Player for InterceptingPlayer {
    async fn play(&self, request: PlaybackRequest) {
        if self.should_negotiate(&request.url) {
            if let Some(url) = classify(&request.url) {
                debug!(canonical = %url.canonical_url(), "intercepting playback for preload");
                let handle = PreloadSession::start(
                    request,
                    url,
                    Arc::clone(&self.transport),
                    self.presenters.open(),
                    Arc::clone(&self.inner),
                );
                *self.session.lock() = Some(handle);
                return;
            }
            debug!("playback url not negotiable, passing through");
        }
        self.inner.play(request).await;
    }
}

/// Registration point standing in for the host's single playback entry.
/// Stores the pre-install player exactly once and restores it exactly once,
/// so repeated installs or uninstalls cannot lose the original.
pub struct PlayerSlot {
    current: Arc<dyn Player>,
    installed: Option<Arc<InterceptingPlayer>>,
}

impl PlayerSlot {
    pub fn new(player: Arc<dyn Player>) -> Self {
        Self {
            current: player,
            installed: None,
        }
    }

    /// The currently registered player
    pub fn player(&self) -> Arc<dyn Player> {
        Arc::clone(&self.current)
    }

    /// The installed decorator, if any
    pub fn interceptor(&self) -> Option<&Arc<InterceptingPlayer>> {
        self.installed.as_ref()
    }

    /// Wrap the registered player with preload interception. A second
    /// install keeps the existing wrapper.
    pub fn install(
        &mut self,
        config: PreloadConfig,
        transport: Arc<dyn CacheTransport>,
        presenters: Arc<dyn PresenterFactory>,
    ) {
        if self.installed.is_some() {
            return;
        }
        let wrapper = Arc::new(InterceptingPlayer::new(
            Arc::clone(&self.current),
            config,
            transport,
            presenters,
        ));
        self.installed = Some(Arc::clone(&wrapper));
        self.current = wrapper;
    }

    /// Cancel any in-flight negotiation and restore the player that was
    /// registered before `install`
    pub fn uninstall(&mut self) {
        if let Some(wrapper) = self.installed.take() {
            wrapper.shutdown();
            self.current = wrapper.inner();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::session::SessionState;
    use crate::test_utils::{
        RecordingFactory, RecordingPlayer, ScriptedTransport, StatsScript, TriggerScript,
        playback_request, stream_request_url,
    };

    fn config() -> PreloadConfig {
        PreloadConfig::builder()
            .with_primary_url("http://127.0.0.1:8090")
            .build()
    }

    fn intercepting(
        config: PreloadConfig,
    ) -> (
        Arc<InterceptingPlayer>,
        Arc<RecordingPlayer>,
        Arc<RecordingFactory>,
    ) {
        let inner = Arc::new(RecordingPlayer::default());
        let factory = Arc::new(RecordingFactory::default());
        let transport = ScriptedTransport::new(TriggerScript::Hang, StatsScript::Hang);
        let player = Arc::new(InterceptingPlayer::new(
            Arc::clone(&inner) as Arc<dyn Player>,
            config,
            transport,
            Arc::clone(&factory) as Arc<dyn PresenterFactory>,
        ));
        (player, inner, factory)
    }

    #[tokio::test]
    async fn test_passthrough_when_disabled() {
        let config = PreloadConfig::builder()
            .with_enabled(false)
            .with_primary_url("http://127.0.0.1:8090")
            .build();
        let (player, inner, factory) = intercepting(config);

        player.play(playback_request()).await;

        assert_eq!(inner.plays.lock().len(), 1);
        assert!(player.take_session().is_none());
        assert!(factory.opened.lock().is_empty());
    }

    #[tokio::test]
    async fn test_passthrough_for_foreign_urls() {
        let (player, inner, factory) = intercepting(config());

        player
            .play(PlaybackRequest {
                url: "https://example.com/video.mp4".to_string(),
                extras: None,
            })
            .await;

        assert_eq!(inner.plays.lock().len(), 1);
        assert!(factory.opened.lock().is_empty());
    }

    #[tokio::test]
    async fn test_passthrough_without_server_address() {
        let (player, inner, _factory) = intercepting(PreloadConfig::default());

        player.play(playback_request()).await;

        assert_eq!(inner.plays.lock().len(), 1);
        assert!(player.take_session().is_none());
    }

    #[tokio::test]
    async fn test_passthrough_when_not_classifiable() {
        let (player, inner, factory) = intercepting(config());

        // right host, but no link hash to negotiate with
        player
            .play(PlaybackRequest {
                url: "http://127.0.0.1:8090/stream/movie.mkv?index=1".to_string(),
                extras: None,
            })
            .await;

        assert_eq!(inner.plays.lock().len(), 1);
        assert!(factory.opened.lock().is_empty());
    }

    #[tokio::test]
    async fn test_local_stream_is_negotiated() {
        let (player, inner, factory) = intercepting(config());

        player.play(playback_request()).await;

        // playback is deferred until the negotiation settles
        assert!(inner.plays.lock().is_empty());
        assert_eq!(factory.opened.lock().len(), 1);

        let session = player.take_session().expect("session should be running");
        session.force_play();
        assert_eq!(session.finished().await, SessionState::Completed);

        let plays = inner.plays.lock();
        assert_eq!(plays.len(), 1);
        assert_eq!(plays[0].url, stream_request_url());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_running_session() {
        let (player, inner, factory) = intercepting(config());

        player.play(playback_request()).await;
        player.shutdown();

        let presenter = Arc::clone(&factory.opened.lock()[0]);
        for _ in 0..200 {
            if presenter.disposed() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(presenter.disposed(), 1);
        assert!(inner.plays.lock().is_empty());
        assert!(player.take_session().is_none());
    }

    #[tokio::test]
    async fn test_slot_install_and_uninstall_once() {
        let inner: Arc<dyn Player> = Arc::new(RecordingPlayer::default());
        let mut slot = PlayerSlot::new(Arc::clone(&inner));

        let transport: Arc<dyn CacheTransport> =
            ScriptedTransport::new(TriggerScript::Hang, StatsScript::Hang);
        let factory: Arc<dyn PresenterFactory> = Arc::new(RecordingFactory::default());

        slot.install(config(), Arc::clone(&transport), Arc::clone(&factory));
        let wrapped = slot.player();
        assert!(!Arc::ptr_eq(&wrapped, &inner));
        assert!(slot.interceptor().is_some());

        // second install keeps the first wrapper
        slot.install(config(), transport, factory);
        assert!(Arc::ptr_eq(&wrapped, &slot.player()));

        slot.uninstall();
        assert!(Arc::ptr_eq(&inner, &slot.player()));
        assert!(slot.interceptor().is_none());

        // second uninstall keeps the restored original
        slot.uninstall();
        assert!(Arc::ptr_eq(&inner, &slot.player()));
    }
}
