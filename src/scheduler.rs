//! Visibility-triggered action scheduling.
//!
//! Callers register an element with a [`TriggerPolicy`] and a
//! [`RevealAction`]. Visibility reports flow from the platform through the
//! policy's state machine, and the action runs on every `Pending -> Fired`
//! transition. A failing action is logged and never affects other entries.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use log::{debug, warn};

use crate::actions::{Firing, RevealAction};
use crate::error::RevealResult;
use crate::trigger::{Transition, TriggerPolicy, TriggerState};
use crate::viewport::{
    ChangeSink, ElementId, SubscriptionHandle, ViewportObserver, VisibilityChange,
    VisibilityPlatform,
};

pub struct WatchEntry {
    pub element: ElementId,
    pub policy: TriggerPolicy,
    pub state: TriggerState,
    /// Set once the action has run at least once.
    pub fired: bool,
    pub handle: SubscriptionHandle,
    action: Rc<dyn RevealAction>,
}

/// Entries keyed by element identity; one entry per element.
pub type ObservationSet = HashMap<ElementId, WatchEntry>;

type Held = Vec<Box<dyn Any>>;

struct Inner<P: VisibilityPlatform> {
    viewport: ViewportObserver<P>,
    entries: ObservationSet,
    // subscription id -> resources its action handed over
    held: HashMap<u64, Held>,
}

impl<P: VisibilityPlatform> Inner<P> {
    fn release(&mut self, handle: &SubscriptionHandle, dropped: &mut Vec<Held>) -> bool {
        let removed = self
            .entries
            .get(&handle.element())
            .is_some_and(|entry| entry.handle == *handle);
        if removed {
            self.entries.remove(&handle.element());
        }
        self.viewport.unwatch(handle);
        if let Some(held) = self.held.remove(&handle.id()) {
            dropped.push(held);
        }
        removed
    }
}

/// Shared handle to the scheduler. Clones refer to the same scheduler.
pub struct Scheduler<P: VisibilityPlatform> {
    inner: Rc<RefCell<Inner<P>>>,
}

impl<P: VisibilityPlatform> Clone for Scheduler<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: VisibilityPlatform> Scheduler<P> {
    /// Build a scheduler over the platform returned by `make_platform`, which
    /// receives the sink its observers must report to.
    pub fn new(make_platform: impl FnOnce(ChangeSink) -> P) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<RefCell<Inner<P>>>| {
            let weak = weak.clone();
            let sink = ChangeSink::new(move |changes| {
                if let Some(inner) = weak.upgrade() {
                    Scheduler { inner }.handle(changes);
                }
            });
            RefCell::new(Inner {
                viewport: ViewportObserver::new(make_platform(sink)),
                entries: HashMap::new(),
                held: HashMap::new(),
            })
        });
        Self { inner }
    }

    /// Register `action` to run when `element` becomes visible under `policy`.
    ///
    /// A second registration for the same element replaces the first.
    pub fn watch(
        &self,
        element: ElementId,
        policy: TriggerPolicy,
        action: impl RevealAction + 'static,
    ) -> RevealResult<SubscriptionHandle> {
        let config = policy.observer_config()?;
        let mut dropped = Vec::new();
        let result = {
            let mut inner = self.inner.borrow_mut();
            if let Some(previous) = inner.entries.get(&element).map(|entry| entry.handle) {
                debug!("replacing registration for element {element}");
                inner.release(&previous, &mut dropped);
            }
            match inner.viewport.watch_config(element, config) {
                Ok(handle) => {
                    inner.entries.insert(
                        element,
                        WatchEntry {
                            element,
                            policy,
                            state: TriggerState::Pending,
                            fired: false,
                            handle,
                            action: Rc::new(action),
                        },
                    );
                    Ok(handle)
                }
                Err(err) => Err(err),
            }
        };
        drop(dropped);
        result
    }

    /// Stop watching and cancel anything the entry's action left running.
    ///
    /// Returns `false` when the entry was already gone (unwatched, replaced or
    /// auto-removed after firing); that is not an error.
    pub fn unwatch(&self, handle: &SubscriptionHandle) -> bool {
        let mut dropped = Vec::new();
        let removed = self.inner.borrow_mut().release(handle, &mut dropped);
        drop(dropped);
        removed
    }

    /// Feed visibility reports, in platform order.
    pub fn handle(&self, changes: &[VisibilityChange]) {
        for change in changes {
            self.handle_one(change);
        }
    }

    fn handle_one(&self, change: &VisibilityChange) {
        let due = {
            let mut inner = self.inner.borrow_mut();
            let Some(entry) = inner.entries.get_mut(&change.element) else {
                return;
            };
            match entry.state.advance(&entry.policy, change) {
                Transition::Fire => Some((entry.handle, entry.action.clone())),
                Transition::Rearm => {
                    debug!("element {} left view, rearmed", change.element);
                    None
                }
                Transition::Stay => None,
            }
        };
        let Some((handle, action)) = due else {
            return;
        };

        let mut firing = Firing::new(change.element);
        if let Err(err) = action.run(&mut firing) {
            warn!("reveal action for element {} failed: {err}", change.element);
        }
        let held = firing.into_held();

        let mut dropped = Vec::new();
        {
            let mut inner = self.inner.borrow_mut();
            let repeat = match inner.entries.get_mut(&change.element) {
                Some(entry) if entry.handle == handle => {
                    entry.fired = true;
                    Some(entry.policy.repeat)
                }
                _ => None,
            };
            match repeat {
                Some(repeat) => {
                    if !repeat {
                        inner.entries.remove(&change.element);
                        inner.viewport.unwatch(&handle);
                    }
                    if !held.is_empty() {
                        if let Some(previous) = inner.held.insert(handle.id(), held) {
                            dropped.push(previous);
                        }
                    }
                }
                // unwatched while the action ran
                None => dropped.push(held),
            }
        }
        drop(dropped);
    }

    /// Release every entry, cancel held resources and disconnect all observers.
    ///
    /// Returns the elements whose action never ran, in id order, so callers
    /// can settle them instead of leaving them half prepared.
    pub fn teardown(&self) -> Vec<ElementId> {
        let mut dropped = Vec::new();
        let mut unfired: Vec<ElementId> = Vec::new();
        {
            let mut inner = self.inner.borrow_mut();
            unfired.extend(
                inner
                    .entries
                    .values()
                    .filter(|entry| !entry.fired)
                    .map(|entry| entry.element),
            );
            let handles: Vec<SubscriptionHandle> =
                inner.entries.values().map(|entry| entry.handle).collect();
            for handle in &handles {
                inner.release(handle, &mut dropped);
            }
            let held: Vec<Held> = inner.held.drain().map(|(_, held)| held).collect();
            dropped.extend(held);
            debug!(
                "scheduler torn down, {} entries released, {} observers left",
                handles.len(),
                inner.viewport.observer_count()
            );
        }
        drop(dropped);
        unfired.sort();
        unfired
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_watching(&self, element: ElementId) -> bool {
        self.inner.borrow().entries.contains_key(&element)
    }

    /// State and fired flag of the entry for `element`, if it is still registered.
    pub fn entry_state(&self, element: ElementId) -> Option<(TriggerState, bool)> {
        self.inner
            .borrow()
            .entries
            .get(&element)
            .map(|entry| (entry.state, entry.fired))
    }

    pub fn policy_of(&self, element: ElementId) -> Option<TriggerPolicy> {
        self.inner
            .borrow()
            .entries
            .get(&element)
            .map(|entry| entry.policy.clone())
    }

    pub fn observer_count(&self) -> usize {
        self.inner.borrow().viewport.observer_count()
    }

    /// Number of subscriptions still holding resources from their actions.
    pub fn held_count(&self) -> usize {
        self.inner.borrow().held.len()
    }

    pub fn with_platform<R>(&self, f: impl FnOnce(&P) -> R) -> R {
        f(self.inner.borrow().viewport.platform())
    }
}
