//! Browser backends for the reveal core.

use std::cell::RefCell;
use std::rc::Rc;

use gloo_timers::callback::{Interval, Timeout};
use log::warn;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::js_sys;
use web_sys::{
    Document, Element, Event, EventTarget, IntersectionObserver, IntersectionObserverEntry,
    IntersectionObserverInit,
};

use crate::error::{RevealError, RevealResult};
use crate::surface::{ClassList, ImageSource, TextSlot};
use crate::timer::{TickFlow, Timers};
use crate::viewport::{
    ChangeSink, ElementId, IdStamps, ObserverConfig, VisibilityChange, VisibilityPlatform,
};

const ID_ATTRIBUTE: &str = "data-reveal-id";

pub fn js_error(context: &str, err: JsValue) -> RevealError {
    RevealError::Dom(format!("{context}: {err:?}"))
}

pub fn select_all(document: &Document, selector: &str) -> RevealResult<Vec<Element>> {
    let list = document
        .query_selector_all(selector)
        .map_err(|err| js_error(selector, err))?;
    Ok((0..list.length())
        .filter_map(|i| list.item(i))
        .filter_map(|node| node.dyn_into::<Element>().ok())
        .collect())
}

/// Maps element ids to elements without holding on to them. Ids are stamped
/// on the element as an attribute and looked up in the document on demand, so
/// an element removed from the page is simply no longer found.
#[derive(Clone)]
pub struct ElementTable {
    document: Document,
    stamps: Rc<RefCell<IdStamps>>,
}

impl ElementTable {
    pub fn new(document: &Document) -> Self {
        Self {
            document: document.clone(),
            stamps: Rc::new(RefCell::new(IdStamps::new())),
        }
    }

    fn selector(value: &str) -> String {
        format!("[{ID_ATTRIBUTE}=\"{value}\"]")
    }

    /// Id for `element`, stamping a fresh one unless it already carries an
    /// id from this table that no other element shares.
    pub fn register(&self, element: &Element) -> RevealResult<ElementId> {
        let existing = element
            .get_attribute(ID_ATTRIBUTE)
            .filter(|value| self.is_unique(value));
        if existing.is_none() && element.has_attribute(ID_ATTRIBUTE) {
            warn!("element carries a duplicate or unusable {ID_ATTRIBUTE}, assigning a new one");
        }
        self.stamps.borrow_mut().assign(existing.as_deref(), |id| {
            element
                .set_attribute(ID_ATTRIBUTE, &id.0.to_string())
                .map_err(|err| js_error("stamping element id", err))
        })
    }

    fn is_unique(&self, value: &str) -> bool {
        self.document
            .query_selector_all(&Self::selector(value))
            .is_ok_and(|found| found.length() == 1)
    }

    pub fn id_of(element: &Element) -> Option<ElementId> {
        element
            .get_attribute(ID_ATTRIBUTE)
            .and_then(|value| value.parse().ok())
            .map(ElementId)
    }

    pub fn get(&self, id: ElementId) -> Option<Element> {
        if !self.stamps.borrow().is_issued(id) {
            return None;
        }
        self.document
            .query_selector(&Self::selector(&id.0.to_string()))
            .ok()
            .flatten()
    }
}

pub struct DomViewport {
    elements: ElementTable,
    sink: ChangeSink,
}

impl DomViewport {
    pub fn new(elements: ElementTable, sink: ChangeSink) -> Self {
        Self { elements, sink }
    }
}

pub struct DomObserver {
    observer: IntersectionObserver,
    _callback: Closure<dyn FnMut(js_sys::Array, IntersectionObserver)>,
}

impl VisibilityPlatform for DomViewport {
    type Observer = DomObserver;

    fn create_observer(&mut self, config: &ObserverConfig) -> RevealResult<DomObserver> {
        let sink = self.sink.clone();
        let callback = Closure::wrap(Box::new(move |entries: js_sys::Array, _: IntersectionObserver| {
            let changes: Vec<VisibilityChange> = entries
                .iter()
                .filter_map(|value| value.dyn_into::<IntersectionObserverEntry>().ok())
                .filter_map(|entry| {
                    Some(VisibilityChange {
                        element: ElementTable::id_of(&entry.target())?,
                        ratio: entry.intersection_ratio(),
                        intersecting: entry.is_intersecting(),
                    })
                })
                .collect();
            sink.deliver(&changes);
        }) as Box<dyn FnMut(js_sys::Array, IntersectionObserver)>);

        let options = IntersectionObserverInit::new();
        options.set_threshold(&JsValue::from_f64(config.threshold.ratio()));
        options.set_root_margin(&config.root_margin);
        let observer =
            IntersectionObserver::new_with_options(callback.as_ref().unchecked_ref(), &options)
                .map_err(|err| js_error("creating intersection observer", err))?;
        Ok(DomObserver {
            observer,
            _callback: callback,
        })
    }

    fn observe(&mut self, observer: &DomObserver, element: ElementId) -> RevealResult<()> {
        let target = self
            .elements
            .get(element)
            .ok_or_else(|| RevealError::Dom(format!("element {element} is not registered")))?;
        observer.observer.observe(&target);
        Ok(())
    }

    fn unobserve(&mut self, observer: &DomObserver, element: ElementId) {
        if let Some(target) = self.elements.get(element) {
            observer.observer.unobserve(&target);
        }
    }

    fn disconnect(&mut self, observer: DomObserver) {
        observer.observer.disconnect();
    }
}

/// Timers backed by gloo. Dropping a handle clears its timer.
#[derive(Clone, Copy, Default)]
pub struct DomTimers;

pub struct DomTimerHandle {
    _interval: Option<Rc<RefCell<Option<Interval>>>>,
    _timeout: Option<Timeout>,
}

impl Timers for DomTimers {
    type Handle = DomTimerHandle;

    fn every(&self, period_ms: u32, mut tick: Box<dyn FnMut() -> TickFlow>) -> DomTimerHandle {
        let slot: Rc<RefCell<Option<Interval>>> = Rc::new(RefCell::new(None));
        let weak_slot = Rc::downgrade(&slot);
        let mut stopped = false;
        let interval = Interval::new(period_ms, move || {
            if stopped {
                return;
            }
            if tick() == TickFlow::Stop {
                stopped = true;
                let finished = match weak_slot.upgrade() {
                    Some(slot) => {
                        let taken = slot.borrow_mut().take();
                        taken
                    }
                    None => None,
                };
                if let Some(interval) = finished {
                    // must not free the closure that is running right now
                    Timeout::new(0, move || drop(interval)).forget();
                }
            }
        });
        *slot.borrow_mut() = Some(interval);
        DomTimerHandle {
            _interval: Some(slot),
            _timeout: None,
        }
    }

    fn once(&self, delay_ms: u32, callback: Box<dyn FnOnce()>) -> DomTimerHandle {
        DomTimerHandle {
            _interval: None,
            _timeout: Some(Timeout::new(delay_ms, callback)),
        }
    }
}

#[derive(Clone)]
pub struct DomElement(pub Element);

impl ClassList for DomElement {
    fn add_class(&self, class: &str) -> RevealResult<()> {
        self.0
            .class_list()
            .add_1(class)
            .map_err(|err| js_error("adding class", err))
    }

    fn remove_class(&self, class: &str) -> RevealResult<()> {
        self.0
            .class_list()
            .remove_1(class)
            .map_err(|err| js_error("removing class", err))
    }

    fn has_class(&self, class: &str) -> bool {
        self.0.class_list().contains(class)
    }
}

impl TextSlot for DomElement {
    fn text(&self) -> String {
        self.0.text_content().unwrap_or_default()
    }

    fn set_text(&self, text: &str) {
        self.0.set_text_content(Some(text));
    }
}

impl ImageSource for DomElement {
    fn attribute(&self, name: &str) -> Option<String> {
        self.0.get_attribute(name)
    }

    fn set_source(&self, src: &str) -> RevealResult<()> {
        self.0
            .set_attribute("src", src)
            .map_err(|err| js_error("setting image source", err))
    }
}

/// An event listener that is removed again when dropped.
pub struct Listener {
    target: EventTarget,
    event: &'static str,
    callback: Closure<dyn FnMut(Event)>,
}

impl Listener {
    pub fn new(
        target: &EventTarget,
        event: &'static str,
        handler: impl FnMut(Event) + 'static,
    ) -> RevealResult<Self> {
        let callback = Closure::wrap(Box::new(handler) as Box<dyn FnMut(Event)>);
        target
            .add_event_listener_with_callback(event, callback.as_ref().unchecked_ref())
            .map_err(|err| js_error(event, err))?;
        Ok(Self {
            target: target.clone(),
            event,
            callback,
        })
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.event, self.callback.as_ref().unchecked_ref());
    }
}
