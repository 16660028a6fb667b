//! The preload negotiation session.
//!
//! One session owns one intercepted playback request. It fires the preload
//! trigger and a single statistics poll against the cache server, feeds
//! progress to the presenter, and reconciles whichever of trigger
//! completion, user cancel or user force-play arrives first into a terminal
//! transition that either hands the request to the real player or drops it.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::CacheTransport;
use crate::player::{PlaybackRequest, Player};
use crate::presenter::ProgressPresenter;
use crate::stats::{ProgressSnapshot, TorrentStats, format_speed};
use crate::url::StreamUrl;

/// Lifecycle of a session. `Completed` and `Cancelled` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Negotiation in flight, user intent accepted
    Active,
    /// Handed off to playback, via trigger completion or force-play
    Completed,
    /// Abandoned by the user, playback never invoked
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Cancel,
    ForcePlay,
}

enum Event {
    TriggerDone,
    Stats(TorrentStats),
}

/// User intent handle, handed to the presenter for its two buttons.
///
/// Both calls are fire-and-forget: once the session reaches a terminal
/// state they become no-ops, so double cancels or a force-play racing a
/// completed trigger are harmless.
#[derive(Clone)]
pub struct SessionActions {
    commands: mpsc::Sender<Command>,
}

impl SessionActions {
    /// Abandon the negotiation without starting playback
    pub fn cancel(&self) {
        let _ = self.commands.try_send(Command::Cancel);
    }

    /// Stop waiting and start playback with whatever is buffered
    pub fn force_play(&self) {
        let _ = self.commands.try_send(Command::ForcePlay);
    }
}

/// Host-side view of a running session. Dropping the handle does not end
/// the negotiation; the presenter keeps its own [`SessionActions`].
pub struct SessionHandle {
    actions: SessionActions,
    state_rx: watch::Receiver<SessionState>,
    progress_rx: watch::Receiver<Option<ProgressSnapshot>>,
    driver: JoinHandle<()>,
}

impl SessionHandle {
    pub fn actions(&self) -> SessionActions {
        self.actions.clone()
    }

    pub fn cancel(&self) {
        self.actions.cancel();
    }

    pub fn force_play(&self) {
        self.actions.force_play();
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Last statistics snapshot received, if any arrived yet
    pub fn progress(&self) -> Option<ProgressSnapshot> {
        self.progress_rx.borrow().clone()
    }

    /// Subscribe to snapshot updates
    pub fn progress_rx(&self) -> watch::Receiver<Option<ProgressSnapshot>> {
        self.progress_rx.clone()
    }

    /// Wait for the session to reach its terminal state
    pub async fn finished(self) -> SessionState {
        let Self {
            state_rx, driver, ..
        } = self;
        let _ = driver.await;
        *state_rx.borrow()
    }
}

pub struct PreloadSession;

impl PreloadSession {
    /// Open the progress dialog and launch the negotiation tasks. Returns
    /// immediately; the terminal transition happens on the spawned driver.
    pub fn start(
        request: PlaybackRequest,
        url: StreamUrl,
        transport: Arc<dyn CacheTransport>,
        presenter: Arc<dyn ProgressPresenter>,
        player: Arc<dyn Player>,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::channel(8);
        let (state_tx, state_rx) = watch::channel(SessionState::Active);
        let (progress_tx, progress_rx) = watch::channel(None);

        let actions = SessionActions {
            commands: command_tx,
        };
        presenter.bind_actions(actions.clone());
        presenter.render(&ProgressSnapshot::default());

        debug!(url = %url.trigger_url(), "starting preload negotiation");

        // Ask the server to begin buffering. Any completion, including a
        // transport failure or the long timeout, means playback should
        // proceed: an unreachable server must not hold the stream hostage.
        let trigger_handle = {
            let transport = Arc::clone(&transport);
            let event_tx = event_tx.clone();
            let trigger_url = url.trigger_url();
            tokio::spawn(async move {
                match transport.trigger(&trigger_url).await {
                    Ok(()) => debug!("preload trigger completed"),
                    Err(e) => debug!(error = %e, "preload trigger failed, proceeding anyway"),
                }
                let _ = event_tx.send(Event::TriggerDone).await;
            })
        };

        // Single statistics poll. Failures and payloads without torrent
        // data produce no update; the dialog simply stops refreshing.
        let stats_handle = {
            let transport = Arc::clone(&transport);
            let cache_url = url.cache_url();
            let hash = url.link.clone();
            tokio::spawn(async move {
                match transport.fetch_stats(&cache_url, &hash).await {
                    Ok(Some(stats)) => {
                        let _ = event_tx.send(Event::Stats(stats)).await;
                    }
                    Ok(None) => debug!("statistics response had no torrent payload"),
                    Err(e) => debug!(error = %e, "statistics request failed"),
                }
            })
        };

        let driver = SessionDriver {
            request,
            presenter,
            player,
            command_rx,
            event_rx,
            state_tx,
            progress_tx,
            trigger_handle,
            stats_handle,
        };
        let driver = tokio::spawn(driver.run());

        SessionHandle {
            actions,
            state_rx,
            progress_rx,
            driver,
        }
    }
}

/// Task owning the request and both child operations for one session.
struct SessionDriver {
    request: PlaybackRequest,
    presenter: Arc<dyn ProgressPresenter>,
    player: Arc<dyn Player>,
    command_rx: mpsc::Receiver<Command>,
    event_rx: mpsc::Receiver<Event>,
    state_tx: watch::Sender<SessionState>,
    progress_tx: watch::Sender<Option<ProgressSnapshot>>,
    trigger_handle: JoinHandle<()>,
    stats_handle: JoinHandle<()>,
}

impl SessionDriver {
    async fn run(mut self) {
        let outcome = self.negotiate().await;
        let _ = self.state_tx.send(outcome);

        // Aborting the transport is best-effort; what guards against late
        // deliveries is this task exiting, since nothing else reads the
        // event channel.
        self.trigger_handle.abort();
        self.stats_handle.abort();
        let _ = tokio::join!(&mut self.trigger_handle, &mut self.stats_handle);

        self.presenter.dispose();

        match outcome {
            SessionState::Completed => {
                info!("preload negotiation complete, handing off to playback");
                self.player.play(self.request).await;
            }
            SessionState::Cancelled => {
                info!("preload negotiation cancelled, playback skipped");
            }
            SessionState::Active => unreachable!("negotiate only returns terminal states"),
        }
    }

    async fn negotiate(&mut self) -> SessionState {
        let mut commands_open = true;
        loop {
            tokio::select! {
                biased;
                command = self.command_rx.recv(), if commands_open => match command {
                    Some(Command::Cancel) => {
                        debug!("user cancelled preload");
                        break SessionState::Cancelled;
                    }
                    Some(Command::ForcePlay) => {
                        debug!("user forced playback");
                        break SessionState::Completed;
                    }
                    // Every actions handle is gone; keep waiting on the
                    // trigger, which resolves the session by itself.
                    None => commands_open = false,
                },
                event = self.event_rx.recv() => match event {
                    Some(Event::TriggerDone) => break SessionState::Completed,
                    Some(Event::Stats(stats)) => self.on_stats(stats),
                    None => {
                        warn!("negotiation tasks died, handing off to playback");
                        break SessionState::Completed;
                    }
                },
            }
        }
    }

    fn on_stats(&mut self, stats: TorrentStats) {
        let snapshot = stats.snapshot();
        debug!(
            peers = snapshot.active_peers,
            percent = snapshot.downloaded_percent,
            speed = %format_speed(snapshot.download_speed_bps),
            "buffering progress"
        );
        self.presenter.render(&snapshot);
        let _ = self.progress_tx.send(Some(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use crate::test_utils::{
        RecordingPlayer, RecordingPresenter, ScriptedTransport, StatsScript, TriggerScript,
        playback_request, stream_url,
    };

    fn start(
        transport: Arc<ScriptedTransport>,
    ) -> (SessionHandle, Arc<RecordingPresenter>, Arc<RecordingPlayer>) {
        let presenter = Arc::new(RecordingPresenter::default());
        let player = Arc::new(RecordingPlayer::default());
        let handle = PreloadSession::start(
            playback_request(),
            stream_url(),
            transport,
            Arc::clone(&presenter) as Arc<dyn ProgressPresenter>,
            Arc::clone(&player) as Arc<dyn Player>,
        );
        (handle, presenter, player)
    }

    #[tokio::test]
    async fn test_trigger_completion_starts_playback() {
        let transport = ScriptedTransport::new(TriggerScript::Resolve, StatsScript::Hang);
        let (handle, presenter, player) = start(Arc::clone(&transport));

        assert_eq!(handle.finished().await, SessionState::Completed);

        let plays = player.plays.lock();
        assert_eq!(plays.len(), 1);
        assert_eq!(plays[0].url, playback_request().url);
        assert_eq!(plays[0].extras, playback_request().extras);
        assert_eq!(presenter.disposed(), 1);

        // the still-pending statistics request was torn down
        assert!(transport.stats_aborted.load(Ordering::SeqCst));
        // and the trigger carried the preload control parameter
        assert_eq!(
            transport.trigger_urls.lock()[0],
            stream_url().trigger_url()
        );
    }

    #[tokio::test]
    async fn test_cancel_skips_playback() {
        let transport = ScriptedTransport::new(TriggerScript::Hang, StatsScript::Hang);
        let (handle, presenter, player) = start(Arc::clone(&transport));

        assert_eq!(handle.state(), SessionState::Active);
        handle.cancel();
        assert_eq!(handle.finished().await, SessionState::Cancelled);

        assert!(player.plays.lock().is_empty());
        assert_eq!(presenter.disposed(), 1);
        assert!(transport.trigger_aborted.load(Ordering::SeqCst));
        assert!(transport.stats_aborted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_force_play_starts_playback() {
        let transport = ScriptedTransport::new(TriggerScript::Hang, StatsScript::Hang);
        let (handle, presenter, player) = start(Arc::clone(&transport));

        handle.force_play();
        assert_eq!(handle.finished().await, SessionState::Completed);

        assert_eq!(player.plays.lock().len(), 1);
        assert_eq!(presenter.disposed(), 1);
        assert!(transport.trigger_aborted.load(Ordering::SeqCst));
        assert!(transport.stats_aborted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dialog_opens_with_zeroed_snapshot() {
        let transport = ScriptedTransport::new(TriggerScript::Hang, StatsScript::Hang);
        let (handle, presenter, _player) = start(transport);

        // rendered synchronously on start, before any statistics arrive
        assert_eq!(
            *presenter.renders.lock(),
            vec![ProgressSnapshot::default()]
        );
        assert!(presenter.actions.lock().is_some());

        handle.cancel();
        handle.finished().await;
    }

    #[tokio::test]
    async fn test_stats_update_reaches_presenter() {
        let transport = ScriptedTransport::new(
            TriggerScript::Hang,
            StatsScript::Report(TorrentStats {
                active_peers: 3,
                preloaded_bytes: 40,
                preload_size: 80,
                download_speed: 125_000.0,
            }),
        );
        let (handle, presenter, player) = start(Arc::clone(&transport));

        let mut progress = handle.progress_rx();
        let snapshot = loop {
            if let Some(snapshot) = progress.borrow_and_update().clone() {
                break snapshot;
            }
            progress.changed().await.unwrap();
        };

        assert_eq!(snapshot.active_peers, 3);
        assert_eq!(snapshot.downloaded_percent, 50);
        assert_eq!(snapshot.download_speed_bps, 1_000_000.0);

        handle.cancel();
        handle.finished().await;

        let renders = presenter.renders.lock();
        assert_eq!(renders.len(), 2);
        assert_eq!(renders[0], ProgressSnapshot::default());
        assert_eq!(renders[1], snapshot);
        assert!(player.plays.lock().is_empty());

        // the poll asked the cache endpoint about the link hash
        assert_eq!(
            transport.stats_requests.lock()[0],
            (
                "http://127.0.0.1:8090/cache".to_string(),
                stream_url().link.clone()
            )
        );
    }

    #[tokio::test]
    async fn test_stats_without_torrent_is_ignored() {
        let transport = ScriptedTransport::new(TriggerScript::Resolve, StatsScript::NoTorrent);
        let (handle, presenter, player) = start(transport);

        let progress = handle.progress_rx();
        assert_eq!(handle.finished().await, SessionState::Completed);

        assert!(progress.borrow().is_none());
        assert_eq!(presenter.renders.lock().len(), 1);
        assert_eq!(player.plays.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_actions_are_no_ops() {
        let transport = ScriptedTransport::new(TriggerScript::Hang, StatsScript::Hang);
        let (handle, presenter, player) = start(transport);

        let actions = handle.actions();
        actions.cancel();
        actions.cancel();
        actions.force_play();

        assert_eq!(handle.finished().await, SessionState::Cancelled);
        assert!(player.plays.lock().is_empty());
        assert_eq!(presenter.disposed(), 1);

        // the session is gone, further intent is dropped silently
        actions.force_play();
        actions.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(player.plays.lock().is_empty());
    }

    #[tokio::test]
    async fn test_presenter_buttons_control_session() {
        let transport = ScriptedTransport::new(TriggerScript::Hang, StatsScript::Hang);
        let (handle, presenter, player) = start(transport);

        presenter.bound_actions().force_play();

        assert_eq!(handle.finished().await, SessionState::Completed);
        assert_eq!(player.plays.lock().len(), 1);
    }
}
