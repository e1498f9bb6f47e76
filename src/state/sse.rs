use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Simple broadcast hub wrapper used by the SSE services.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// One lazily created hub per room code.
pub struct RoomHubs {
    hubs: DashMap<String, SseHub>,
    capacity: usize,
}

impl RoomHubs {
    pub fn new(capacity: usize) -> Self {
        Self {
            hubs: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to a room's events, creating its hub on first use.
    pub fn subscribe(&self, code: &str) -> broadcast::Receiver<ServerEvent> {
        self.hubs
            .entry(code.to_owned())
            .or_insert_with(|| SseHub::new(self.capacity))
            .subscribe()
    }

    /// Deliver an event to the room's subscribers, if it has any.
    pub fn broadcast(&self, code: &str, event: ServerEvent) {
        if let Some(hub) = self.hubs.get(code) {
            hub.broadcast(event);
        }
    }

    /// Drop the hub; pending subscribers observe the channel closing.
    pub fn remove(&self, code: &str) {
        self.hubs.remove(code);
    }

    /// Drop hubs that nobody listens to any more.
    pub fn prune_idle(&self) {
        self.hubs.retain(|_, hub| hub.subscriber_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_stay_inside_their_room() {
        let hubs = RoomHubs::new(4);
        let mut a = hubs.subscribe("AAAAAA");
        let mut b = hubs.subscribe("BBBBBB");

        hubs.broadcast("AAAAAA", ServerEvent::new(Some("ping".into()), "1".into()));

        assert_eq!(a.recv().await.unwrap().data, "1");
        assert!(b.try_recv().is_err());
    }

    #[tokio::test]
    async fn removing_a_hub_closes_subscribers() {
        let hubs = RoomHubs::new(4);
        let mut rx = hubs.subscribe("AAAAAA");
        hubs.remove("AAAAAA");
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[test]
    fn prune_keeps_watched_rooms() {
        let hubs = RoomHubs::new(4);
        let _watching = hubs.subscribe("AAAAAA");
        drop(hubs.subscribe("BBBBBB"));
        hubs.prune_idle();
        assert!(hubs.hubs.contains_key("AAAAAA"));
        assert!(!hubs.hubs.contains_key("BBBBBB"));
    }
}
