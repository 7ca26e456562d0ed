use crossterm::event::{self, Event as CrosstermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Terminal events the watch loop cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
  /// Terminal window regained focus
  FocusGained,
  /// `q`, Esc or Ctrl-C
  Quit,
  /// Nothing happened for a tick
  Tick,
}

fn translate(event: CrosstermEvent) -> Option<Event> {
  match event {
    CrosstermEvent::FocusGained => Some(Event::FocusGained),
    CrosstermEvent::Key(key) if is_quit(&key) => Some(Event::Quit),
    _ => None,
  }
}

fn is_quit(key: &KeyEvent) -> bool {
  if key.kind != KeyEventKind::Press {
    return false;
  }
  match key.code {
    KeyCode::Char('q') | KeyCode::Esc => true,
    KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
    _ => false,
  }
}

/// Event handler that produces events from terminal input and a tick timer
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate.
  ///
  /// Terminal reads block, so they run on the blocking pool.
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::task::spawn_blocking(move || loop {
      let next = match event::poll(tick_rate) {
        Ok(true) => match event::read() {
          Ok(evt) => translate(evt),
          Err(e) => {
            debug!(error = %e, "Terminal read failed");
            None
          }
        },
        Ok(false) => Some(Event::Tick),
        Err(e) => {
          debug!(error = %e, "Terminal poll failed, stopping input");
          break;
        }
      };

      if let Some(evt) = next {
        if tx.send(evt).is_err() {
          break;
        }
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
