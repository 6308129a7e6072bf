//! Provider event stream with replay for late subscribers.
//!
//! Built on a broadcast channel plus a replay slot: live subscribers receive
//! events as they are emitted, and a subscriber attaching after an emission
//! still observes the last event. An internal receiver keeps the channel
//! open while no external subscriber exists.

use std::sync::RwLock;

use tokio::sync::broadcast;

/// Events observable on the provider's event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderEvent {
    /// The provider is initialized and serving real configuration data.
    Ready,
}

/// Buffer for live subscribers that fall behind.
const EVENT_BUFFER: usize = 5;

pub(crate) struct EventBroadcaster {
    sender: broadcast::Sender<ProviderEvent>,
    replay: RwLock<Option<ProviderEvent>>,
    _receiver: broadcast::Receiver<ProviderEvent>,
}

impl EventBroadcaster {
    pub(crate) fn new() -> EventBroadcaster {
        let (sender, receiver) = broadcast::channel(EVENT_BUFFER);
        EventBroadcaster {
            sender,
            replay: RwLock::new(None),
            _receiver: receiver,
        }
    }

    /// Record `event` for replay and deliver it to live subscribers.
    ///
    /// Returns `false` when the event could not be recorded; the caller is
    /// expected to compensate.
    pub(crate) fn try_emit(&self, event: ProviderEvent) -> bool {
        let Ok(mut replay) = self.replay.write() else {
            return false;
        };
        *replay = Some(event);
        // A send error means there are no live receivers, which is fine: the
        // replay slot covers subscribers that attach later.
        let _ = self.sender.send(event);
        true
    }

    /// Subscribe to the stream, replaying the last emitted event first.
    pub(crate) fn subscribe(&self) -> EventStream {
        // Subscribe before reading the replay slot so an emission racing this
        // call cannot be missed; the stream deduplicates the case where it is
        // observed twice.
        let receiver = self.sender.subscribe();
        let replay = self.replay.read().ok().and_then(|slot| *slot);
        EventStream {
            replay,
            receiver,
            seen_ready: false,
        }
    }
}

/// Subscriber end of the provider event stream.
pub struct EventStream {
    replay: Option<ProviderEvent>,
    receiver: broadcast::Receiver<ProviderEvent>,
    seen_ready: bool,
}

impl EventStream {
    /// Receive the next event. Returns `None` once the provider is gone and
    /// all events have been observed.
    pub async fn next(&mut self) -> Option<ProviderEvent> {
        loop {
            let event = match self.replay.take() {
                Some(event) => event,
                None => match self.receiver.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::debug!(target: "flagbridge", "event subscriber lagged behind by {skipped} events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
            };
            // `Ready` is one-shot per subscriber: drop the duplicate when a
            // replayed event races its own live broadcast.
            if event == ProviderEvent::Ready {
                if self.seen_ready {
                    continue;
                }
                self.seen_ready = true;
            }
            return Some(event);
        }
    }
}
