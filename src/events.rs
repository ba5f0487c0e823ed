//! Session event bus.
//!
//! Viewport and store mutations are published here and delivered once per frame.
//! Listeners see every queued event in order; the frame summary returned by
//! [`EventBus::drain_frame`] collapses them into at most one tile redraw and one
//! overlay redraw.

use std::collections::VecDeque;

use crate::store::StoreEvent;
use crate::viewport::ViewportEvent;

/// Anything that invalidates a rendered layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Viewport(ViewportEvent),
    Store(StoreEvent),
}

pub type SubscriptionId = u64;

pub type Listener = Box<dyn FnMut(&SessionEvent)>;

/// What a frame has to redraw after draining the queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameUpdate {
    /// Latest committed viewport, if it changed this frame
    pub viewport: Option<ViewportEvent>,
    /// Latest store change, if any
    pub store: Option<StoreEvent>,
    /// Number of events delivered
    pub delivered: usize,
}

impl FrameUpdate {
    pub fn is_empty(&self) -> bool {
        self.delivered == 0
    }

    /// Tiles only depend on the viewport.
    pub fn needs_tile_redraw(&self) -> bool {
        self.viewport.is_some()
    }

    pub fn needs_overlay_redraw(&self) -> bool {
        self.viewport.is_some() || self.store.is_some()
    }
}

/// Bounded single-threaded publish/subscribe queue.
pub struct EventBus {
    listeners: Vec<(SubscriptionId, Listener)>,
    queue: VecDeque<SessionEvent>,
    capacity: usize,
    next_id: SubscriptionId,
    /// Viewport events superseded because the queue was full
    coalesced: u64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            listeners: Vec::new(),
            queue: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            next_id: 1,
            coalesced: 0,
        }
    }

    pub fn subscribe(&mut self, listener: Listener) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Remove a listener. Returns false if the id was unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }

    /// Queue an event for the next frame.
    ///
    /// When the queue is full the oldest viewport event is dropped; the newer one
    /// carries a complete snapshot. Store events are deltas and are never dropped,
    /// so a queue holding only store events grows past its capacity.
    pub fn publish(&mut self, event: SessionEvent) {
        if self.queue.len() >= self.capacity {
            let victim = self
                .queue
                .iter()
                .position(|e| matches!(e, SessionEvent::Viewport(_)));
            match victim {
                Some(index) => {
                    self.queue.remove(index);
                    self.coalesced += 1;
                    log::debug!("Event queue full ({}), coalesced oldest viewport event", self.capacity);
                }
                None => log::debug!(
                    "Event queue over capacity ({}) with {} store events pending",
                    self.capacity,
                    self.queue.len()
                ),
            }
        }
        self.queue.push_back(event);
    }

    /// Deliver all queued events to the listeners and summarize the frame.
    pub fn drain_frame(&mut self) -> FrameUpdate {
        let mut update = FrameUpdate::default();
        while let Some(event) = self.queue.pop_front() {
            for (_, listener) in self.listeners.iter_mut() {
                listener(&event);
            }
            match event {
                SessionEvent::Viewport(e) => update.viewport = Some(e),
                SessionEvent::Store(e) => update.store = Some(e),
            }
            update.delivered += 1;
        }
        update
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_EVENT_QUEUE_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .field("pending", &self.queue.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Point, Rect};
    use crate::store::StoreChange;
    use crate::viewport::{ScreenSize, Viewport, ZoomLimits};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn viewport() -> Viewport {
        Viewport::new(
            Rect::new(0.0, 0.0, 1000.0, 1000.0),
            ScreenSize::new(100.0, 100.0),
            ZoomLimits::default(),
        )
        .unwrap()
    }

    fn store_event(revision: u64) -> StoreEvent {
        StoreEvent {
            revision,
            change: StoreChange::Selection(None),
        }
    }

    #[test]
    fn test_listeners_see_every_event_once() {
        let mut bus = EventBus::new(16);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bus.subscribe(Box::new(move |e| sink.borrow_mut().push(e.clone())));

        let mut vp = viewport();
        bus.publish(SessionEvent::Viewport(vp.pan(Point::new(1.0, 0.0)).unwrap()));
        bus.publish(SessionEvent::Store(store_event(1)));
        bus.publish(SessionEvent::Viewport(vp.pan(Point::new(1.0, 0.0)).unwrap()));

        let update = bus.drain_frame();
        assert_eq!(update.delivered, 3);
        assert_eq!(update.viewport.map(|e| e.revision), Some(2));
        assert!(update.needs_tile_redraw());
        assert!(update.needs_overlay_redraw());
        assert_eq!(seen.borrow().len(), 3);

        // Nothing left for the next frame
        assert!(bus.drain_frame().is_empty());
    }

    #[test]
    fn test_store_only_frame_skips_tiles() {
        let mut bus = EventBus::new(4);
        bus.publish(SessionEvent::Store(store_event(1)));
        let update = bus.drain_frame();
        assert!(!update.needs_tile_redraw());
        assert!(update.needs_overlay_redraw());
    }

    #[test]
    fn test_full_queue_drops_oldest_viewport_event() {
        let mut bus = EventBus::new(2);
        let mut vp = viewport();
        bus.publish(SessionEvent::Store(store_event(1)));
        bus.publish(SessionEvent::Viewport(vp.pan(Point::new(1.0, 0.0)).unwrap()));
        bus.publish(SessionEvent::Viewport(vp.pan(Point::new(1.0, 0.0)).unwrap()));
        assert_eq!(bus.pending(), 2);
        assert_eq!(bus.coalesced(), 1);

        let update = bus.drain_frame();
        assert_eq!(update.store, Some(store_event(1)));
        assert_eq!(update.viewport.map(|e| e.revision), Some(2));
    }

    #[test]
    fn test_full_queue_never_drops_store_events() {
        let mut bus = EventBus::new(2);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bus.subscribe(Box::new(move |e| sink.borrow_mut().push(e.clone())));

        let removed = StoreEvent {
            revision: 1,
            change: StoreChange::Removed(7),
        };
        let mut vp = viewport();
        bus.publish(SessionEvent::Store(removed.clone()));
        bus.publish(SessionEvent::Store(store_event(2)));
        bus.publish(SessionEvent::Viewport(vp.pan(Point::new(1.0, 0.0)).unwrap()));
        assert_eq!(bus.pending(), 3);
        assert_eq!(bus.coalesced(), 0);

        // A further viewport change supersedes the queued one
        bus.publish(SessionEvent::Viewport(vp.pan(Point::new(1.0, 0.0)).unwrap()));
        assert_eq!(bus.pending(), 3);
        assert_eq!(bus.coalesced(), 1);

        let update = bus.drain_frame();
        assert_eq!(update.viewport.map(|e| e.revision), Some(2));
        let seen = seen.borrow();
        assert!(seen.contains(&SessionEvent::Store(removed)));
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_unsubscribe() {
        let mut bus = EventBus::new(4);
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        let id = bus.subscribe(Box::new(move |_| *c.borrow_mut() += 1));
        bus.publish(SessionEvent::Store(store_event(1)));
        bus.drain_frame();
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(SessionEvent::Store(store_event(2)));
        bus.drain_frame();
        assert_eq!(*count.borrow(), 1);
    }
}
