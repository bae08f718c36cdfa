//! In-memory stand-ins for the browser: a viewport whose visibility ratios are
//! set by hand, timers driven by virtual time, and a recording element.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::{Rc, Weak};

use crate::error::{RevealError, RevealResult};
use crate::surface::{ClassList, ImageSource, TextSlot};
use crate::timer::{TickFlow, Timers};
use crate::viewport::{ChangeSink, ElementId, ObserverConfig, VisibilityChange, VisibilityPlatform};

struct ObserverState {
    threshold: f64,
    members: HashSet<ElementId>,
}

#[derive(Default)]
struct ViewportState {
    sink: Option<ChangeSink>,
    observers: HashMap<u64, ObserverState>,
    next_observer: u64,
    created: usize,
    ratios: HashMap<ElementId, f64>,
}

/// Viewport that reports a change whenever a ratio set through
/// [`ManualViewport::set_ratio`] crosses an observing threshold, like an
/// intersection observer does. Clones share state.
#[derive(Clone, Default)]
pub struct ManualViewport {
    state: Rc<RefCell<ViewportState>>,
}

pub struct ManualObserver {
    id: u64,
}

fn is_visible(ratio: f64, threshold: f64) -> bool {
    ratio > 0.0 && ratio >= threshold
}

fn is_valid_margin(margin: &str) -> bool {
    let parts: Vec<&str> = margin.split_whitespace().collect();
    (1..=4).contains(&parts.len())
        && parts.iter().all(|part| {
            part.strip_suffix("px")
                .or_else(|| part.strip_suffix('%'))
                .is_some_and(|n| n.parse::<f64>().is_ok())
        })
}

impl ManualViewport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(self, sink: ChangeSink) -> Self {
        self.state.borrow_mut().sink = Some(sink);
        self
    }

    /// Move `element` to `ratio`, reporting it if that crosses a threshold it is observed at.
    pub fn set_ratio(&self, element: ElementId, ratio: f64) {
        let (sink, crossed) = {
            let mut state = self.state.borrow_mut();
            let previous = state.ratios.insert(element, ratio).unwrap_or(0.0);
            let crossed = state.observers.values().any(|observer| {
                observer.members.contains(&element)
                    && is_visible(previous, observer.threshold) != is_visible(ratio, observer.threshold)
            });
            (state.sink.clone(), crossed)
        };
        if let (Some(sink), true) = (sink, crossed) {
            sink.deliver(&[VisibilityChange::new(element, ratio)]);
        }
    }

    /// Deliver raw reports, crossing or not.
    pub fn report(&self, changes: &[VisibilityChange]) {
        let sink = self.state.borrow().sink.clone();
        if let Some(sink) = sink {
            sink.deliver(changes);
        }
    }

    pub fn is_observed(&self, element: ElementId) -> bool {
        self.state
            .borrow()
            .observers
            .values()
            .any(|observer| observer.members.contains(&element))
    }

    pub fn created_observers(&self) -> usize {
        self.state.borrow().created
    }

    pub fn live_observers(&self) -> usize {
        self.state.borrow().observers.len()
    }
}

impl VisibilityPlatform for ManualViewport {
    type Observer = ManualObserver;

    fn create_observer(&mut self, config: &ObserverConfig) -> RevealResult<ManualObserver> {
        if !is_valid_margin(&config.root_margin) {
            return Err(RevealError::Dom(format!(
                "root margin {:?} is not a valid margin",
                config.root_margin
            )));
        }
        let mut state = self.state.borrow_mut();
        state.next_observer += 1;
        state.created += 1;
        let id = state.next_observer;
        state.observers.insert(
            id,
            ObserverState {
                threshold: config.threshold.ratio(),
                members: HashSet::new(),
            },
        );
        Ok(ManualObserver { id })
    }

    fn observe(&mut self, observer: &ManualObserver, element: ElementId) -> RevealResult<()> {
        match self.state.borrow_mut().observers.get_mut(&observer.id) {
            Some(state) => {
                state.members.insert(element);
                Ok(())
            }
            None => Err(RevealError::Dom("observer is disconnected".to_string())),
        }
    }

    fn unobserve(&mut self, observer: &ManualObserver, element: ElementId) {
        if let Some(state) = self.state.borrow_mut().observers.get_mut(&observer.id) {
            state.members.remove(&element);
        }
    }

    fn disconnect(&mut self, observer: ManualObserver) {
        self.state.borrow_mut().observers.remove(&observer.id);
    }
}

enum Callback {
    Every(Box<dyn FnMut() -> TickFlow>),
    Once(Box<dyn FnOnce()>),
}

struct Scheduled {
    due: u64,
    period: u64,
    callback: Option<Callback>,
}

#[derive(Default)]
struct TimerState {
    now: u64,
    next_id: u64,
    timers: BTreeMap<u64, Scheduled>,
}

/// Timers on a virtual millisecond clock moved by [`ManualTimers::advance`].
#[derive(Clone, Default)]
pub struct ManualTimers {
    state: Rc<RefCell<TimerState>>,
}

pub struct ManualTimerHandle {
    id: u64,
    state: Weak<RefCell<TimerState>>,
}

impl Drop for ManualTimerHandle {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            // skipped when dropped while the clock itself holds the state
            if let Ok(mut state) = state.try_borrow_mut() {
                state.timers.remove(&self.id);
            }
        }
    }
}

impl ManualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> u64 {
        self.state.borrow().now
    }

    /// Timers still scheduled.
    pub fn pending(&self) -> usize {
        self.state.borrow().timers.len()
    }

    /// Move the clock forward, running every timer that comes due on the way in time order.
    pub fn advance(&self, ms: u64) {
        let until = self.state.borrow().now + ms;
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                let due = state
                    .timers
                    .iter()
                    .filter(|(_, timer)| timer.due <= until && timer.callback.is_some())
                    .min_by_key(|(id, timer)| (timer.due, **id))
                    .map(|(id, timer)| (*id, timer.due));
                match due {
                    Some((id, due)) => {
                        state.now = due;
                        state
                            .timers
                            .get_mut(&id)
                            .and_then(|timer| timer.callback.take())
                            .map(|callback| (id, callback))
                    }
                    None => None,
                }
            };
            let Some((id, callback)) = next else {
                break;
            };

            match callback {
                Callback::Every(mut tick) => {
                    let flow = tick();
                    let mut state = self.state.borrow_mut();
                    match flow {
                        TickFlow::Continue => {
                            if let Some(timer) = state.timers.get_mut(&id) {
                                timer.due += timer.period;
                                timer.callback = Some(Callback::Every(tick));
                            }
                        }
                        TickFlow::Stop => {
                            state.timers.remove(&id);
                        }
                    }
                }
                Callback::Once(callback) => {
                    self.state.borrow_mut().timers.remove(&id);
                    callback();
                }
            }
        }
        self.state.borrow_mut().now = until;
    }

    fn schedule(&self, delay_ms: u32, callback: Callback) -> ManualTimerHandle {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        let period = u64::from(delay_ms.max(1));
        let due = state.now + period;
        state.timers.insert(
            id,
            Scheduled {
                due,
                period,
                callback: Some(callback),
            },
        );
        ManualTimerHandle {
            id,
            state: Rc::downgrade(&self.state),
        }
    }
}

impl Timers for ManualTimers {
    type Handle = ManualTimerHandle;

    fn every(&self, period_ms: u32, tick: Box<dyn FnMut() -> TickFlow>) -> ManualTimerHandle {
        self.schedule(period_ms, Callback::Every(tick))
    }

    fn once(&self, delay_ms: u32, callback: Box<dyn FnOnce()>) -> ManualTimerHandle {
        self.schedule(delay_ms, Callback::Once(callback))
    }
}

#[derive(Default)]
struct ElementState {
    classes: Vec<String>,
    class_log: Vec<String>,
    text: String,
    text_history: Vec<String>,
    attributes: HashMap<String, String>,
    source: Option<String>,
}

/// Element double recording every class and text change. Clones share state.
#[derive(Clone, Default)]
pub struct FakeElement {
    state: Rc<RefCell<ElementState>>,
}

impl FakeElement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: &str) -> Self {
        let element = Self::new();
        element.state.borrow_mut().text = text.to_string();
        element
    }

    pub fn with_attribute(self, name: &str, value: &str) -> Self {
        self.state
            .borrow_mut()
            .attributes
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_class(self, class: &str) -> Self {
        self.state.borrow_mut().classes.push(class.to_string());
        self
    }

    /// How many times `class` was added, including re-adding a present class.
    pub fn class_additions(&self, class: &str) -> usize {
        self.state
            .borrow()
            .class_log
            .iter()
            .filter(|c| c.as_str() == class)
            .count()
    }

    pub fn text_writes(&self) -> usize {
        self.state.borrow().text_history.len()
    }

    pub fn text_history(&self) -> Vec<String> {
        self.state.borrow().text_history.clone()
    }

    pub fn source(&self) -> Option<String> {
        self.state.borrow().source.clone()
    }
}

impl ClassList for FakeElement {
    fn add_class(&self, class: &str) -> RevealResult<()> {
        let mut state = self.state.borrow_mut();
        state.class_log.push(class.to_string());
        if !state.classes.iter().any(|c| c == class) {
            state.classes.push(class.to_string());
        }
        Ok(())
    }

    fn remove_class(&self, class: &str) -> RevealResult<()> {
        self.state.borrow_mut().classes.retain(|c| c != class);
        Ok(())
    }

    fn has_class(&self, class: &str) -> bool {
        self.state.borrow().classes.iter().any(|c| c == class)
    }
}

impl TextSlot for FakeElement {
    fn text(&self) -> String {
        self.state.borrow().text.clone()
    }

    fn set_text(&self, text: &str) {
        let mut state = self.state.borrow_mut();
        state.text = text.to_string();
        state.text_history.push(text.to_string());
    }
}

impl ImageSource for FakeElement {
    fn attribute(&self, name: &str) -> Option<String> {
        self.state.borrow().attributes.get(name).cloned()
    }

    fn set_source(&self, src: &str) -> RevealResult<()> {
        self.state.borrow_mut().source = Some(src.to_string());
        Ok(())
    }
}
