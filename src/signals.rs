//! Injected trigger sources for window focus and network reconnect.
//!
//! The query engine never listens to process-wide events directly. Whoever
//! owns the environment (the CLI, a test) emits into [`LifecycleSignals`] and
//! every active query driver subscribed to it reacts according to its config.

use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const SIGNAL_CAPACITY: usize = 16;

/// Broadcast hub for environment events.
#[derive(Debug, Clone)]
pub struct LifecycleSignals {
  focus: broadcast::Sender<()>,
  reconnect: broadcast::Sender<()>,
}

impl Default for LifecycleSignals {
  fn default() -> Self {
    Self::new()
  }
}

impl LifecycleSignals {
  pub fn new() -> Self {
    let (focus, _) = broadcast::channel(SIGNAL_CAPACITY);
    let (reconnect, _) = broadcast::channel(SIGNAL_CAPACITY);
    Self { focus, reconnect }
  }

  /// The window (terminal) regained focus.
  pub fn focus_gained(&self) {
    debug!("Focus gained");
    // No receivers just means no active queries
    let _ = self.focus.send(());
  }

  /// Network connectivity came back after an outage.
  pub fn reconnected(&self) {
    info!("Connection restored, refreshing queries");
    let _ = self.reconnect.send(());
  }

  pub(crate) fn subscribe_focus(&self) -> broadcast::Receiver<()> {
    self.focus.subscribe()
  }

  pub(crate) fn subscribe_reconnect(&self) -> broadcast::Receiver<()> {
    self.reconnect.subscribe()
  }
}

/// Spawn a task that probes connectivity every `period` and emits
/// [`LifecycleSignals::reconnected`] on every offline → online edge.
pub fn spawn_connectivity_probe<F, Fut>(
  signals: LifecycleSignals,
  period: Duration,
  mut probe: F,
) -> JoinHandle<()>
where
  F: FnMut() -> Fut + Send + 'static,
  Fut: Future<Output = bool> + Send,
{
  tokio::spawn(async move {
    let mut online = true;
    let mut ticker = tokio::time::interval(period);

    loop {
      ticker.tick().await;
      let reachable = probe().await;
      match (online, reachable) {
        (true, false) => info!("Connection lost"),
        (false, true) => signals.reconnected(),
        _ => {}
      }
      online = reachable;
    }
  })
}
