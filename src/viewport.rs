//! Visibility monitoring over a platform intersection primitive.
//!
//! One platform observer backs every element watched with the same
//! [`ObserverConfig`]; it is created on the first `watch` for that
//! configuration and disconnected once its last element is unwatched.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use log::debug;

use crate::error::{RevealError, RevealResult};

/// Identity of a page element. The platform maps ids back to real elements;
/// nothing in the core holds the element itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out element ids and remembers which ones it issued, so an id already
/// stamped on an element can be told apart from a value written in the markup.
#[derive(Debug, Default)]
pub struct IdStamps {
    next: u64,
    issued: HashSet<u64>,
}

impl IdStamps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for an element currently carrying `existing`.
    ///
    /// An id this table issued is kept. Anything else gets a fresh id, which
    /// is only issued once `stamp` has written it onto the element.
    pub fn assign(
        &mut self,
        existing: Option<&str>,
        stamp: impl FnOnce(ElementId) -> RevealResult<()>,
    ) -> RevealResult<ElementId> {
        if let Some(value) = existing {
            match value.parse::<u64>() {
                Ok(id) if self.issued.contains(&id) => return Ok(ElementId(id)),
                _ => debug!("replacing element id {value:?} not issued here"),
            }
        }
        self.next += 1;
        let id = ElementId(self.next);
        stamp(id)?;
        self.issued.insert(id.0);
        Ok(id)
    }

    pub fn is_issued(&self, id: ElementId) -> bool {
        self.issued.contains(&id.0)
    }
}

/// Visibility ratio in `[0, 1]` an element must reach to count as visible.
#[derive(Debug, Clone, Copy)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(ratio: f64) -> RevealResult<Self> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(RevealError::InvalidArgument(format!(
                "threshold ratio {ratio} is outside [0, 1]"
            )));
        }
        // -0.0 and 0.0 must share an observer group
        Ok(Self(if ratio == 0.0 { 0.0 } else { ratio }))
    }

    pub fn ratio(self) -> f64 {
        self.0
    }
}

impl PartialEq for Threshold {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Threshold {}

impl Hash for Threshold {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// Settings a platform observer is created with. Elements sharing a config share an observer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObserverConfig {
    pub threshold: Threshold,
    pub root_margin: String,
}

impl ObserverConfig {
    pub fn new(threshold_ratio: f64, root_margin: impl Into<String>) -> RevealResult<Self> {
        Ok(Self {
            threshold: Threshold::new(threshold_ratio)?,
            root_margin: root_margin.into(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    element: ElementId,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn element(&self) -> ElementId {
        self.element
    }
}

/// A visibility report for one element, as delivered by the platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityChange {
    pub element: ElementId,
    pub ratio: f64,
    pub intersecting: bool,
}

impl VisibilityChange {
    pub fn new(element: ElementId, ratio: f64) -> Self {
        Self {
            element,
            ratio,
            intersecting: ratio > 0.0,
        }
    }
}

/// Where a platform delivers visibility reports, in the order it observed them.
#[derive(Clone)]
pub struct ChangeSink(Rc<dyn Fn(&[VisibilityChange])>);

impl ChangeSink {
    pub fn new(deliver: impl Fn(&[VisibilityChange]) + 'static) -> Self {
        Self(Rc::new(deliver))
    }

    pub fn deliver(&self, changes: &[VisibilityChange]) {
        if !changes.is_empty() {
            (self.0)(changes);
        }
    }
}

/// The platform intersection primitive. Observers report through the
/// [`ChangeSink`] the platform was built with.
pub trait VisibilityPlatform: 'static {
    type Observer;

    fn create_observer(&mut self, config: &ObserverConfig) -> RevealResult<Self::Observer>;
    fn observe(&mut self, observer: &Self::Observer, element: ElementId) -> RevealResult<()>;
    fn unobserve(&mut self, observer: &Self::Observer, element: ElementId);
    fn disconnect(&mut self, observer: Self::Observer);
}

struct ObserverGroup<O> {
    observer: O,
    // element -> live subscriptions in this group
    members: HashMap<ElementId, usize>,
}

pub struct ViewportObserver<P: VisibilityPlatform> {
    platform: P,
    groups: HashMap<ObserverConfig, ObserverGroup<P::Observer>>,
    subscriptions: HashMap<u64, (ElementId, ObserverConfig)>,
    next_id: u64,
}

impl<P: VisibilityPlatform> ViewportObserver<P> {
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            groups: HashMap::new(),
            subscriptions: HashMap::new(),
            next_id: 1,
        }
    }

    /// Start monitoring `element` at `threshold_ratio` against the viewport shrunk or grown by `root_margin`.
    pub fn watch(
        &mut self,
        element: ElementId,
        threshold_ratio: f64,
        root_margin: &str,
    ) -> RevealResult<SubscriptionHandle> {
        let config = ObserverConfig::new(threshold_ratio, root_margin)?;
        self.watch_config(element, config)
    }

    pub fn watch_config(
        &mut self,
        element: ElementId,
        config: ObserverConfig,
    ) -> RevealResult<SubscriptionHandle> {
        if !self.groups.contains_key(&config) {
            let observer = self.platform.create_observer(&config)?;
            debug!(
                "created observer for threshold {} margin {:?}",
                config.threshold.ratio(),
                config.root_margin
            );
            self.groups.insert(
                config.clone(),
                ObserverGroup {
                    observer,
                    members: HashMap::new(),
                },
            );
        }

        let group = match self.groups.get_mut(&config) {
            Some(group) => group,
            None => return Err(RevealError::Dom("observer group vanished".to_string())),
        };
        if !group.members.contains_key(&element) {
            if let Err(err) = self.platform.observe(&group.observer, element) {
                if group.members.is_empty() {
                    if let Some(group) = self.groups.remove(&config) {
                        self.platform.disconnect(group.observer);
                    }
                }
                return Err(err);
            }
        }
        *group.members.entry(element).or_insert(0) += 1;

        let id = self.next_id;
        self.next_id += 1;
        self.subscriptions.insert(id, (element, config));
        Ok(SubscriptionHandle { id, element })
    }

    /// Stop monitoring. Returns `false` when the handle was already released.
    pub fn unwatch(&mut self, handle: &SubscriptionHandle) -> bool {
        let Some((element, config)) = self.subscriptions.remove(&handle.id) else {
            return false;
        };
        let Some(group) = self.groups.get_mut(&config) else {
            return true;
        };

        let remaining = match group.members.get_mut(&element) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            group.members.remove(&element);
            self.platform.unobserve(&group.observer, element);
        }
        if group.members.is_empty() {
            if let Some(group) = self.groups.remove(&config) {
                debug!(
                    "disconnecting observer for threshold {}",
                    config.threshold.ratio()
                );
                self.platform.disconnect(group.observer);
            }
        }
        true
    }

    pub fn is_watching(&self, handle: &SubscriptionHandle) -> bool {
        self.subscriptions.contains_key(&handle.id)
    }

    pub fn config_of(&self, handle: &SubscriptionHandle) -> Option<&ObserverConfig> {
        self.subscriptions.get(&handle.id).map(|(_, config)| config)
    }

    /// Live platform observers.
    pub fn observer_count(&self) -> usize {
        self.groups.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualViewport;

    fn observer() -> (ManualViewport, ViewportObserver<ManualViewport>) {
        let viewport = ManualViewport::new();
        let observer = ViewportObserver::new(viewport.clone().connect(ChangeSink::new(|_| {})));
        (viewport, observer)
    }

    #[test]
    fn rejects_thresholds_outside_unit_interval() {
        let (_, mut observer) = observer();
        for ratio in [-0.1, -1.0, 1.000_001, 2.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = observer.watch(ElementId(1), ratio, "0px").unwrap_err();
            assert!(matches!(err, RevealError::InvalidArgument(_)), "ratio {ratio}");
        }
        assert_eq!(observer.observer_count(), 0);
    }

    #[test]
    fn accepts_unit_interval_bounds() {
        let (_, mut observer) = observer();
        assert!(observer.watch(ElementId(1), 0.0, "0px").is_ok());
        assert!(observer.watch(ElementId(2), 1.0, "0px").is_ok());
        assert!(observer.watch(ElementId(3), -0.0, "0px").is_ok());
        // -0.0 joins the 0.0 group
        assert_eq!(observer.observer_count(), 2);
    }

    #[test]
    fn shares_one_observer_per_config() {
        let (viewport, mut observer) = observer();
        let a = observer.watch(ElementId(1), 0.1, "0px 0px -50px 0px").unwrap();
        let b = observer.watch(ElementId(2), 0.1, "0px 0px -50px 0px").unwrap();
        let c = observer.watch(ElementId(3), 0.5, "0px").unwrap();
        assert_eq!(observer.observer_count(), 2);
        assert_eq!(viewport.created_observers(), 2);

        assert!(observer.unwatch(&a));
        assert_eq!(observer.observer_count(), 2);
        assert!(observer.unwatch(&b));
        assert_eq!(observer.observer_count(), 1);
        assert!(observer.unwatch(&c));
        assert_eq!(observer.observer_count(), 0);
        assert_eq!(viewport.live_observers(), 0);
    }

    #[test]
    fn unwatch_is_idempotent() {
        let (viewport, mut observer) = observer();
        let handle = observer.watch(ElementId(7), 0.5, "0px").unwrap();
        assert!(viewport.is_observed(ElementId(7)));
        assert!(observer.unwatch(&handle));
        assert!(!observer.unwatch(&handle));
        assert!(!observer.unwatch(&handle));
        assert!(!viewport.is_observed(ElementId(7)));
        assert!(!observer.is_watching(&handle));
    }

    #[test]
    fn duplicate_subscriptions_keep_element_observed() {
        let (viewport, mut observer) = observer();
        let first = observer.watch(ElementId(4), 0.5, "0px").unwrap();
        let second = observer.watch(ElementId(4), 0.5, "0px").unwrap();
        assert_ne!(first, second);
        observer.unwatch(&first);
        assert!(viewport.is_observed(ElementId(4)));
        observer.unwatch(&second);
        assert!(!viewport.is_observed(ElementId(4)));
    }

    #[test]
    fn stamps_keep_issued_ids_and_replace_foreign_ones() {
        let mut stamps = IdStamps::new();
        let first = stamps.assign(None, |_| Ok(())).unwrap();
        assert_eq!(stamps.assign(Some("1"), |_| Ok(())).unwrap(), first);

        // markup values, even duplicated ones, never alias an issued id
        let a = stamps.assign(Some("42"), |_| Ok(())).unwrap();
        let b = stamps.assign(Some("42"), |_| Ok(())).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, ElementId(42));
        assert!(!stamps.is_issued(ElementId(42)));
        assert_eq!(stamps.assign(Some("not-a-number"), |_| Ok(())).unwrap(), ElementId(4));
    }

    #[test]
    fn failed_stamp_issues_nothing() {
        let mut stamps = IdStamps::new();
        let err = stamps
            .assign(None, |_| Err(RevealError::Dom("read-only element".to_string())))
            .unwrap_err();
        assert!(matches!(err, RevealError::Dom(_)));
        assert!(!stamps.is_issued(ElementId(1)));

        // the unstamped id cannot be claimed later through the markup
        let next = stamps.assign(Some("1"), |_| Ok(())).unwrap();
        assert_eq!(next, ElementId(2));
    }

    #[test]
    fn bad_root_margin_leaves_no_group_behind() {
        let (_, mut observer) = observer();
        let err = observer.watch(ElementId(1), 0.5, "sideways").unwrap_err();
        assert!(matches!(err, RevealError::Dom(_)));
        assert_eq!(observer.observer_count(), 0);
        assert_eq!(observer.subscription_count(), 0);
    }
}
