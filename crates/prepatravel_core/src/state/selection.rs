//! Map selection state for the UI session.
//!
//! # Responsibility
//! - Hold the focused (hover) and selected (click) node references.
//! - Notify subscribed observers synchronously on every write.
//!
//! # Invariants
//! - Both fields are independent; writing one never touches the other.
//! - No referential validation: any id, or `None`, is accepted.
//! - Observers run after the new value is stored, in subscription order.
//! - Changes are delivered in write order. A write made by an observer is
//!   queued and delivered once the current change has reached every observer.
//! - State lives only as long as the store handle; nothing is persisted.

use crate::model::map_node::MapNodeId;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

/// Which selection field a change refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionField {
    Focused,
    Selected,
}

/// Notification payload delivered to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionChange {
    pub field: SelectionField,
    pub previous: Option<MapNodeId>,
    pub current: Option<MapNodeId>,
}

impl SelectionChange {
    /// Same-value writes still notify; this tells them apart.
    pub fn is_noop(&self) -> bool {
        self.previous == self.current
    }
}

/// Point-in-time copy of both fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionSnapshot {
    pub focused_node: Option<MapNodeId>,
    pub selected_node: Option<MapNodeId>,
}

type Observer = Rc<dyn Fn(&SelectionChange)>;

#[derive(Default)]
struct Inner {
    state: Cell<SelectionSnapshot>,
    observers: RefCell<Vec<(u64, Observer)>>,
    next_observer_id: Cell<u64>,
    pending: RefCell<VecDeque<SelectionChange>>,
    delivering: Cell<bool>,
}

/// Session-scoped selection context.
///
/// Cloning yields another handle to the same state, so one instance built at
/// startup can be handed to every UI component that needs it.
#[derive(Clone, Default)]
pub struct SelectionStore {
    inner: Rc<Inner>,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focused_node(&self) -> Option<MapNodeId> {
        self.inner.state.get().focused_node
    }

    pub fn selected_node(&self) -> Option<MapNodeId> {
        self.inner.state.get().selected_node
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        self.inner.state.get()
    }

    /// Replaces the focused node (hover/preview emphasis).
    pub fn set_focused_node(&self, id: Option<MapNodeId>) {
        self.write(SelectionField::Focused, id);
    }

    /// Replaces the selected node (explicit user choice).
    pub fn set_selected_node(&self, id: Option<MapNodeId>) {
        self.write(SelectionField::Selected, id);
    }

    /// Resets both fields to `None`, focused first.
    pub fn clear(&self) {
        self.write(SelectionField::Focused, None);
        self.write(SelectionField::Selected, None);
    }

    /// Registers `observer` for changes to either field.
    ///
    /// Delivery stops when the returned `Subscription` is dropped. An
    /// observer that captures a store handle keeps the store alive until it
    /// is unsubscribed.
    pub fn subscribe(&self, observer: impl Fn(&SelectionChange) + 'static) -> Subscription {
        let id = self.inner.next_observer_id.get();
        self.inner.next_observer_id.set(id + 1);
        self.inner
            .observers
            .borrow_mut()
            .push((id, Rc::new(observer)));

        Subscription {
            store: Rc::downgrade(&self.inner),
            id,
        }
    }

    /// Registers `observer` for one field only; it receives the new value.
    pub fn observe(
        &self,
        field: SelectionField,
        observer: impl Fn(Option<MapNodeId>) + 'static,
    ) -> Subscription {
        self.subscribe(move |change| {
            if change.field == field {
                observer(change.current);
            }
        })
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    fn write(&self, field: SelectionField, id: Option<MapNodeId>) {
        let mut state = self.inner.state.get();
        let slot = match field {
            SelectionField::Focused => &mut state.focused_node,
            SelectionField::Selected => &mut state.selected_node,
        };
        let previous = std::mem::replace(slot, id);
        self.inner.state.set(state);

        self.inner.pending.borrow_mut().push_back(SelectionChange {
            field,
            previous,
            current: id,
        });
        if self.inner.delivering.replace(true) {
            return;
        }

        let _delivery = Delivery(&self.inner);
        loop {
            let Some(change) = self.inner.pending.borrow_mut().pop_front() else {
                break;
            };
            // Snapshot so observers may subscribe or unsubscribe re-entrantly.
            let observers: Vec<Observer> = self
                .inner
                .observers
                .borrow()
                .iter()
                .map(|(_, observer)| Rc::clone(observer))
                .collect();
            for observer in observers {
                observer(&change);
            }
        }
    }
}

/// Ends a delivery round, even when an observer panics.
struct Delivery<'a>(&'a Inner);

impl Drop for Delivery<'_> {
    fn drop(&mut self) {
        self.0.pending.borrow_mut().clear();
        self.0.delivering.set(false);
    }
}

impl std::fmt::Debug for SelectionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionStore")
            .field("state", &self.inner.state.get())
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// Handle that keeps an observer registered.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    store: Weak<Inner>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            inner
                .observers
                .borrow_mut()
                .retain(|(id, _)| *id != self.id);
        }
    }
}
