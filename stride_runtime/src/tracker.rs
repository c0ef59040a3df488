use std::{cell::RefCell, rc::Rc};

use log::trace;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExecutionEvent {
    /// The line about to execute
    Line(usize),
    Started,
    Stopped,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Rc<dyn Fn(ExecutionEvent)>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<(SubscriptionId, Subscriber)>,
}

/// Fan-out channel for execution progress. Subscribers run in registration
/// order and may subscribe or unsubscribe from inside a callback, which
/// takes effect from the next event on.
#[derive(Clone, Default)]
pub struct ExecutionTracker {
    subscribers: Rc<RefCell<Subscribers>>,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, f: impl Fn(ExecutionEvent) + 'static) -> SubscriptionId {
        let mut subscribers = self.subscribers.borrow_mut();
        let id = SubscriptionId(subscribers.next_id);
        subscribers.next_id += 1;
        subscribers.entries.push((id, Rc::new(f)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.entries.len();
        subscribers.entries.retain(|(entry, _)| *entry != id);
        subscribers.entries.len() != before
    }

    pub fn line(&self, line: usize) {
        trace!("Line {line}");
        self.emit(ExecutionEvent::Line(line));
    }

    pub fn started(&self) {
        self.emit(ExecutionEvent::Started);
    }

    pub fn stopped(&self) {
        self.emit(ExecutionEvent::Stopped);
    }

    fn emit(&self, event: ExecutionEvent) {
        let snapshot: Vec<Subscriber> = self
            .subscribers
            .borrow()
            .entries
            .iter()
            .map(|(_, f)| f.clone())
            .collect();
        for f in snapshot {
            f(event);
        }
    }
}

impl std::fmt::Debug for ExecutionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionTracker")
            .field("subscribers", &self.subscribers.borrow().entries.len())
            .finish()
    }
}
