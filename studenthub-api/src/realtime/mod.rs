//! Live delivery of chat events.
//!
//! Every room that has at least one connected subscriber owns a broadcast
//! channel. Publishing never waits on subscribers: a subscriber that falls
//! behind loses its place and is disconnected from the room.

use dashmap::DashMap;
use protocol::ServerEvent;
use studenthub_common::model::{Id, chat::RoomMarker};
use tokio::sync::broadcast;
use tracing::debug;

pub mod protocol;
pub mod ws;

pub const ROOM_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
pub struct ChatHub {
    rooms: DashMap<Id<RoomMarker>, broadcast::Sender<ServerEvent>>,
    capacity: usize,
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::new(ROOM_CHANNEL_CAPACITY)
    }
}

impl ChatHub {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, room_id: Id<RoomMarker>) -> broadcast::Receiver<ServerEvent> {
        self.rooms
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Sends `event` to everyone in the room. Returns how many subscribers got it.
    pub fn publish(&self, room_id: Id<RoomMarker>, event: ServerEvent) -> usize {
        let Some(sender) = self.rooms.get(&room_id) else {
            debug!(%room_id, "No live subscribers for room");
            return 0;
        };

        sender.send(event).unwrap_or(0)
    }

    /// Forgets the room's channel once nobody listens anymore.
    pub fn prune(&self, room_id: Id<RoomMarker>) {
        if self
            .rooms
            .remove_if(&room_id, |_, sender| sender.receiver_count() == 0)
            .is_some()
        {
            debug!(%room_id, "Dropped idle room channel");
        }
    }

    #[must_use]
    pub fn live_rooms(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::realtime::{ChatHub, protocol::ServerEvent};
    use studenthub_common::model::Id;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn subscribers_receive_room_events() {
        let hub = ChatHub::default();
        let mut first = hub.subscribe(Id::new(1));
        let mut second = hub.subscribe(Id::new(1));
        let mut other_room = hub.subscribe(Id::new(2));

        let delivered = hub.publish(Id::new(1), ServerEvent::Joined { room_id: Id::new(1) });
        assert_eq!(delivered, 2);

        assert_eq!(
            first.recv().await.unwrap(),
            ServerEvent::Joined { room_id: Id::new(1) }
        );
        assert_eq!(
            second.recv().await.unwrap(),
            ServerEvent::Joined { room_id: Id::new(1) }
        );
        assert!(other_room.try_recv().is_err());
    }

    #[test]
    fn publishing_to_an_empty_room_is_a_no_op() {
        let hub = ChatHub::default();
        assert_eq!(hub.publish(Id::new(3), ServerEvent::error("nobody")), 0);
        assert_eq!(hub.live_rooms(), 0);
    }

    #[test]
    fn prune_keeps_rooms_with_listeners() {
        let hub = ChatHub::default();
        let listener = hub.subscribe(Id::new(1));
        drop(hub.subscribe(Id::new(2)));

        hub.prune(Id::new(1));
        hub.prune(Id::new(2));
        assert_eq!(hub.live_rooms(), 1);

        drop(listener);
        hub.prune(Id::new(1));
        assert_eq!(hub.live_rooms(), 0);
    }

    #[tokio::test]
    async fn slow_subscribers_lag() {
        let hub = ChatHub::new(2);
        let mut slow = hub.subscribe(Id::new(1));

        for n in 0..5 {
            hub.publish(Id::new(1), ServerEvent::error(format!("event {n}")));
        }

        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(3))));
    }
}
