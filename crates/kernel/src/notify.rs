use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use worldspace_common::{Notification, Severity};

/// Outbound notification queue.
///
/// Cheap to clone; every clone feeds the same queue. The runtime, the
/// ingestion pipeline and every sandboxed mod push into it and the host
/// drains it.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    queue: Rc<RefCell<VecDeque<Notification>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: impl Into<String>, severity: Severity) {
        let note = Notification::new(message, severity);
        match severity {
            Severity::Error => tracing::warn!(message = %note.message, "notify"),
            _ => tracing::info!(message = %note.message, ?severity, "notify"),
        }
        self.queue.borrow_mut().push_back(note);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(message, Severity::Success);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(message, Severity::Info);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.push(message, Severity::Warning);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(message, Severity::Error);
    }

    /// Take every queued notification, oldest first.
    pub fn drain(&self) -> Vec<Notification> {
        self.queue.borrow_mut().drain(..).collect()
    }

    /// Copy of the queue without consuming it.
    pub fn pending(&self) -> Vec<Notification> {
        self.queue.borrow().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}
