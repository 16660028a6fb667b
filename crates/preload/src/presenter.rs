use std::sync::Arc;

use crate::session::SessionActions;
use crate::stats::ProgressSnapshot;

/// UI side of one negotiation: a dialog with a progress text block and two
/// buttons, cancel and launch.
///
/// The session renders a zeroed snapshot when the dialog opens and a fresh
/// one on every statistics update.
pub trait ProgressPresenter: Send + Sync {
    /// Show the given snapshot
    fn render(&self, snapshot: &ProgressSnapshot);

    /// Hand the presenter the session controls its buttons map to. Called
    /// once, before the first render.
    fn bind_actions(&self, actions: SessionActions);

    /// Tear down the dialog and release any UI focus it held. Must be
    /// idempotent.
    fn dispose(&self);
}

/// Opens the progress dialog for a negotiation. The engine asks for a fresh
/// presenter each time it intercepts a playback request.
pub trait PresenterFactory: Send + Sync {
    fn open(&self) -> Arc<dyn ProgressPresenter>;
}
