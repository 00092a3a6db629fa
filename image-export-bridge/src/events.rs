//! Start/end notifications around data realization
//!
//! Observers are plain closures. They run synchronously, in registration
//! order, on the thread that triggered the realization.

use std::fmt;

/// Events fired by the export bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportEvent {
    /// Data realization is about to start
    Start,
    /// Data realization finished successfully
    End,
}

impl fmt::Display for ExportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportEvent::Start => write!(f, "Start"),
            ExportEvent::End => write!(f, "End"),
        }
    }
}

/// Identifies a registered observer so it can be removed again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverTag(u64);

struct Observer {
    tag: ObserverTag,
    /// `None` observes every event
    event: Option<ExportEvent>,
    callback: Box<dyn FnMut(ExportEvent)>,
}

/// Registry of event observers
#[derive(Default)]
pub struct EventNotifier {
    observers: Vec<Observer>,
    next_tag: u64,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe a single event
    pub fn add_observer<F>(&mut self, event: ExportEvent, callback: F) -> ObserverTag
    where
        F: FnMut(ExportEvent) + 'static,
    {
        self.push(Some(event), Box::new(callback))
    }

    /// Observe every event
    pub fn add_any_observer<F>(&mut self, callback: F) -> ObserverTag
    where
        F: FnMut(ExportEvent) + 'static,
    {
        self.push(None, Box::new(callback))
    }

    /// Remove an observer; returns false if the tag is unknown
    pub fn remove_observer(&mut self, tag: ObserverTag) -> bool {
        let before = self.observers.len();
        self.observers.retain(|observer| observer.tag != tag);
        self.observers.len() != before
    }

    /// True if anything would be notified of `event`
    pub fn has_observer(&self, event: ExportEvent) -> bool {
        self.observers
            .iter()
            .any(|observer| observer.event.map_or(true, |e| e == event))
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Notify every observer of `event`
    pub fn invoke(&mut self, event: ExportEvent) {
        log::trace!("Invoking {} event ({} observers)", event, self.observers.len());
        for observer in &mut self.observers {
            if observer.event.map_or(true, |e| e == event) {
                (observer.callback)(event);
            }
        }
    }

    fn push(&mut self, event: Option<ExportEvent>, callback: Box<dyn FnMut(ExportEvent)>) -> ObserverTag {
        self.next_tag += 1;
        let tag = ObserverTag(self.next_tag);
        self.observers.push(Observer { tag, event, callback });
        tag
    }
}

impl fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventNotifier")
            .field("observers", &self.observers.len())
            .finish()
    }
}
