use std::cell::{Cell as StdCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use slotmap::{SlotMap, new_key_type};
use tracing::trace;

use crate::types::Position;

new_key_type! {
    /// Identifies one listener registered on a grid.
    pub struct SubscriptionId;
}

/// What changed in a grid's cell collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureChange {
    /// The whole collection was replaced.
    Reset,
    Added(Position),
    Removed(Position),
    Replaced(Position),
    Moved { from: Position, to: Position },
    /// A bulk insert finished; per-cell notifications were withheld.
    BulkInserted { count: usize },
}

type Listener = Rc<dyn Fn(&StructureChange)>;

/// Synchronous fan-out of structure changes to registered listeners.
#[derive(Default)]
pub(crate) struct Notifier {
    listeners: RefCell<SlotMap<SubscriptionId, Listener>>,
    suppressed: StdCell<bool>,
}

impl Notifier {
    pub(crate) fn subscribe<F>(self: &Rc<Self>, listener: F) -> Subscription
    where
        F: Fn(&StructureChange) + 'static,
    {
        let id = self.listeners.borrow_mut().insert(Rc::new(listener));
        Subscription {
            notifier: Rc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.borrow_mut().remove(id).is_some()
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub(crate) fn is_suppressed(&self) -> bool {
        self.suppressed.get()
    }

    /// Withholds notifications until the guard drops.
    pub(crate) fn suppress(&self) -> SuppressGuard<'_> {
        let previous = self.suppressed.replace(true);
        SuppressGuard {
            notifier: self,
            previous,
        }
    }

    pub(crate) fn emit(&self, change: StructureChange) {
        if self.suppressed.get() {
            trace!(?change, "notification suppressed");
            return;
        }
        // Listeners may subscribe or unsubscribe while running.
        let listeners: Vec<Listener> = self.listeners.borrow().values().cloned().collect();
        trace!(?change, listeners = listeners.len(), "notifying listeners");
        for listener in listeners {
            listener(&change);
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.listener_count())
            .field("suppressed", &self.suppressed.get())
            .finish()
    }
}

pub(crate) struct SuppressGuard<'a> {
    notifier: &'a Notifier,
    previous: bool,
}

impl Drop for SuppressGuard<'_> {
    fn drop(&mut self) {
        self.notifier.suppressed.set(self.previous);
    }
}

/// Listener registration that is removed when this guard is dropped or cancelled.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    notifier: Weak<Notifier>,
    id: SubscriptionId,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.notifier
            .upgrade()
            .is_some_and(|n| n.listeners.borrow().contains_key(self.id))
    }

    /// Unsubscribes now. Returns false if the grid is gone or the listener was already removed.
    pub fn cancel(self) -> bool {
        self.release()
    }

    fn release(&self) -> bool {
        match self.notifier.upgrade() {
            Some(notifier) => notifier.unsubscribe(self.id),
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
