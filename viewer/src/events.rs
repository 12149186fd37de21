use std::cell::RefCell;

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};

use crate::error::LoadError;
use crate::model::ModelInfo;

/// Events a subscriber can fall behind by before newer ones are dropped for it.
pub const EVENT_CAPACITY: usize = 256;

/// Status updates for whatever shows loading bars and notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    LoadStarted { name: String },
    /// Whole percent, never decreasing within one load.
    Progress(u8),
    Loaded(ModelInfo),
    LoadFailed { error: LoadError, message: String },
    WireframeToggled(bool),
    Disposed,
}

/// Fans events out to every live subscriber. Nothing is kept when nobody listens.
#[derive(Default)]
pub struct EventChannel {
    subscribers: RefCell<Vec<Sender<ViewerEvent>>>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each receiver sees every event sent after it subscribed.
    pub fn subscribe(&self) -> Receiver<ViewerEvent> {
        let (sender, receiver) = bounded(EVENT_CAPACITY);
        self.subscribers.borrow_mut().push(sender);
        receiver
    }

    pub fn send(&self, event: ViewerEvent) {
        self.subscribers
            .borrow_mut()
            .retain(|subscriber| match subscriber.try_send(event.clone()) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_is_queued_without_subscribers() {
        let channel = EventChannel::new();
        for _ in 0..1000 {
            channel.send(ViewerEvent::Progress(1));
        }
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[test]
    fn test_every_subscriber_sees_every_event() {
        let channel = EventChannel::new();
        let first = channel.subscribe();
        let second = channel.subscribe();

        channel.send(ViewerEvent::WireframeToggled(true));
        channel.send(ViewerEvent::Disposed);

        let expected = vec![ViewerEvent::WireframeToggled(true), ViewerEvent::Disposed];
        assert_eq!(first.try_iter().collect::<Vec<_>>(), expected);
        assert_eq!(second.try_iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_slow_subscribers_are_capped_and_dropped_ones_removed() {
        let channel = EventChannel::new();
        let slow = channel.subscribe();
        let gone = channel.subscribe();
        drop(gone);

        for percent in 0..=u8::MAX {
            channel.send(ViewerEvent::Progress(percent));
        }
        channel.send(ViewerEvent::Disposed);

        assert_eq!(channel.subscriber_count(), 1);
        assert_eq!(slow.len(), EVENT_CAPACITY);
        assert_eq!(slow.recv().unwrap(), ViewerEvent::Progress(0));
    }
}
