use std::time::Duration;

use crossterm::event::{Event as CrosstermEvent, EventStream, KeyEvent, KeyEventKind};
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::AppResult;

/// Terminal events.
#[derive(Clone, Copy, Debug)]
pub enum Event {
    /// Terminal tick.
    Tick,
    /// Key press.
    Key(KeyEvent),
    /// Terminal resize.
    Resize,
}

/// Terminal event handler.
#[derive(Debug)]
pub struct EventHandler {
    receiver: mpsc::UnboundedReceiver<Event>,
    cancel_token: CancellationToken,
}

impl EventHandler {
    /// Constructs a new instance of [`EventHandler`].
    pub fn new(tick_rate_ms: u64) -> Self {
        let tick_rate = Duration::from_millis(tick_rate_ms);
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        tokio::spawn(event_thread(sender, tick_rate, cancel_token.clone()));
        Self {
            receiver,
            cancel_token,
        }
    }

    /// Receive the next event from the handler thread.
    pub async fn next(&mut self) -> AppResult<Event> {
        self.receiver
            .recv()
            .await
            .ok_or_else(|| "Terminal event stream closed".into())
    }
}

impl Drop for EventHandler {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn event_thread(
    sender: mpsc::UnboundedSender<Event>,
    tick_rate: Duration,
    cancel_token: CancellationToken,
) {
    let mut reader = EventStream::new();
    let mut tick = tokio::time::interval(tick_rate);
    loop {
        let tick_delay = tick.tick();
        let crossterm_event = reader.next().fuse();
        let event = tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = tick_delay => Event::Tick,
            Some(Ok(evt)) = crossterm_event => match evt {
                // Windows also reports releases
                CrosstermEvent::Key(key) if key.kind == KeyEventKind::Press => Event::Key(key),
                CrosstermEvent::Resize(_, _) => Event::Resize,
                _ => continue,
            },
        };
        if sender.send(event).is_err() {
            break;
        }
    }
}
