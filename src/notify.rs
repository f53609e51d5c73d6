use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Collection, Event};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for change notifications, one channel per collection.
pub struct NotifyHub {
    channels: DashMap<Collection, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to every change in a collection. Creates the channel if needed.
    pub fn subscribe(&self, collection: Collection) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(collection)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish an event on its collection's channel. No-op if nobody is listening.
    pub fn send(&self, event: &Event) {
        if let Some(sender) = self.channels.get(&event.collection()) {
            let _ = sender.send(event.clone());
        }
    }

    pub fn receiver_count(&self, collection: Collection) -> usize {
        self.channels
            .get(&collection)
            .map_or(0, |s| s.receiver_count())
    }
}
