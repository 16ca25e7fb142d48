use serde::Serialize;

use crate::error::RuntimeError;
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    VariableChanged,
    EventTriggered,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogueEvent {
    VariableChanged {
        name: String,
        value: Value,
        previous: Value,
    },
    EventTriggered {
        name: String,
    },
}

impl DialogueEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DialogueEvent::VariableChanged { .. } => EventKind::VariableChanged,
            DialogueEvent::EventTriggered { .. } => EventKind::EventTriggered,
        }
    }
}

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback = Box<dyn FnMut(&DialogueEvent)>;

struct Listener {
    id: ListenerId,
    kind: EventKind,
    callback: Callback,
}

/// Synchronous listener registry. Listeners run in registration order,
/// inside the call that caused the event.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, kind: EventKind, callback: F) -> ListenerId
    where
        F: FnMut(&DialogueEvent) + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push(Listener {
            id,
            kind,
            callback: Box::new(callback),
        });
        id
    }

    pub fn off(&mut self, id: ListenerId) -> Result<(), RuntimeError> {
        let position = self
            .listeners
            .iter()
            .position(|l| l.id == id)
            .ok_or(RuntimeError::ListenerNotFound)?;
        self.listeners.remove(position);
        Ok(())
    }

    pub fn emit(&mut self, event: &DialogueEvent) {
        let kind = event.kind();
        for listener in self.listeners.iter_mut().filter(|l| l.kind == kind) {
            (listener.callback)(event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn listeners_run_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();

        let first = Rc::clone(&log);
        bus.on(EventKind::EventTriggered, move |e| {
            if let DialogueEvent::EventTriggered { name } = e {
                first.borrow_mut().push(format!("first:{name}"));
            }
        });
        let second = Rc::clone(&log);
        bus.on(EventKind::EventTriggered, move |e| {
            if let DialogueEvent::EventTriggered { name } = e {
                second.borrow_mut().push(format!("second:{name}"));
            }
        });
        let ignored = Rc::clone(&log);
        bus.on(EventKind::VariableChanged, move |_| {
            ignored.borrow_mut().push("variable".to_string());
        });

        bus.emit(&DialogueEvent::EventTriggered {
            name: "boom".to_string(),
        });
        assert_eq!(*log.borrow(), vec!["first:boom", "second:boom"]);
    }

    #[test]
    fn off_removes_listener_and_rejects_unknown_ids() {
        let count = Rc::new(RefCell::new(0));
        let mut bus = EventBus::new();
        let counter = Rc::clone(&count);
        let id = bus.on(EventKind::VariableChanged, move |_| {
            *counter.borrow_mut() += 1;
        });

        let event = DialogueEvent::VariableChanged {
            name: "a".to_string(),
            value: Value::from(1),
            previous: Value::Null,
        };
        bus.emit(&event);
        bus.off(id).unwrap();
        bus.emit(&event);

        assert_eq!(*count.borrow(), 1);
        assert!(matches!(bus.off(id), Err(RuntimeError::ListenerNotFound)));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = DialogueEvent::VariableChanged {
            name: "a".to_string(),
            value: Value::from(2),
            previous: Value::Null,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({"type": "variable_changed", "name": "a", "value": 2.0, "previous": null})
        );
    }
}
