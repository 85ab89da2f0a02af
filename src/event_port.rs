//! One-directional message port with start/stop delivery gating.
//!
//! A port never calls listeners itself. [`EventPort::emit`] hands back the
//! messages that are ready for delivery and the caller dispatches them to the
//! listeners registered *at that moment*, so delivery is always late-bound.
//! Messages emitted while the port is stopped are kept in a backlog until
//! [`EventPort::start`] arms it.

use std::collections::VecDeque;

use crate::Message;

pub struct EventPort<L> {
    name: &'static str,
    listeners: Vec<L>,
    backlog: VecDeque<Message>,
    started: bool,
    closed: bool,
}

impl<L> EventPort<L> {
    /// Create a stopped port.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            listeners: Vec::new(),
            backlog: VecDeque::new(),
            started: false,
            closed: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn listeners(&self) -> &[L] {
        &self.listeners
    }

    /// Register `listener` unless `same` matches an already registered one.
    ///
    /// Returns false if the listener was already present or the port is closed.
    pub fn add_listener_with(&mut self, listener: L, same: impl FnMut(&L) -> bool) -> bool {
        if self.closed || self.listeners.iter().any(same) {
            return false;
        }

        self.listeners.push(listener);
        true
    }

    /// Unregister the first listener matching `same`. Unknown listeners are ignored.
    pub fn remove_listener_with(&mut self, same: impl FnMut(&L) -> bool) -> bool {
        match self.listeners.iter().position(same) {
            Some(index) => {
                self.listeners.remove(index);
                true
            }
            None => false,
        }
    }

    /// Arm delivery.
    ///
    /// Returns true if the port transitioned from stopped to started and has
    /// a backlog that the caller should schedule a flush for.
    pub fn start(&mut self) -> bool {
        if self.closed || self.started {
            return false;
        }

        self.started = true;
        !self.backlog.is_empty()
    }

    /// Offer a message to the port.
    ///
    /// While stopped the message is buffered and nothing is returned. Once
    /// started, any backlog is returned first so per-port order is preserved.
    /// A closed port drops everything.
    pub fn emit(&mut self, message: Message) -> Vec<Message> {
        if self.closed {
            log::trace!("{}: dropping message on closed port", self.name);
            return Vec::new();
        }

        self.backlog.push_back(message);

        if !self.started {
            return Vec::new();
        }

        self.backlog.drain(..).collect()
    }

    /// Take the backlog of a started port.
    pub fn flush(&mut self) -> Vec<Message> {
        if !self.started || self.closed {
            return Vec::new();
        }

        self.backlog.drain(..).collect()
    }

    /// Stop delivery for good and release listeners and buffered messages.
    pub fn close(&mut self) {
        self.started = false;
        self.closed = true;
        self.listeners.clear();
        self.backlog.clear();
    }
}

impl<L: PartialEq> EventPort<L> {
    pub fn add_listener(&mut self, listener: L) -> bool {
        let same = |l: &L| *l == listener;
        if self.closed || self.listeners.iter().any(same) {
            return false;
        }

        self.listeners.push(listener);
        true
    }

    pub fn remove_listener(&mut self, listener: &L) -> bool {
        self.remove_listener_with(|l| l == listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stopped_port_buffers() {
        let mut port: EventPort<u32> = EventPort::new("test");
        port.add_listener(1);

        assert!(port.emit(json!(1)).is_empty());
        assert!(port.emit(json!(2)).is_empty());
        assert!(port.flush().is_empty());

        assert!(port.start());
        assert_eq!(port.flush(), vec![json!(1), json!(2)]);
        assert!(port.flush().is_empty());
    }

    #[test]
    fn test_emit_after_start_keeps_order_with_backlog() {
        let mut port: EventPort<u32> = EventPort::new("test");

        port.emit(json!("a"));
        assert!(port.start());
        // The flush task has not run yet; a newer message must not overtake the backlog.
        assert_eq!(port.emit(json!("b")), vec![json!("a"), json!("b")]);
        assert!(port.flush().is_empty());
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut port: EventPort<u32> = EventPort::new("test");
        assert!(!port.start());
        assert!(!port.start());
        assert!(port.is_started());
    }

    #[test]
    fn test_listener_identity() {
        let mut port: EventPort<u32> = EventPort::new("test");

        assert!(port.add_listener(7));
        assert!(!port.add_listener(7));
        assert_eq!(port.listeners(), &[7]);

        assert!(!port.remove_listener(&8));
        assert!(port.remove_listener(&7));
        assert!(port.listeners().is_empty());
    }

    #[test]
    fn test_closed_port_drops_everything() {
        let mut port: EventPort<u32> = EventPort::new("test");
        port.add_listener(1);
        port.start();
        port.close();

        assert!(port.is_closed());
        assert!(!port.is_started());
        assert!(port.listeners().is_empty());
        assert!(port.emit(json!(1)).is_empty());
        assert!(!port.start());
        assert!(!port.add_listener(2));
    }
}
