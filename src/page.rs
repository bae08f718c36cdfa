//! Wires every page behaviour to the document once it is ready.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use log::{debug, info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Document, Element, Event, HtmlElement, PageTransitionEvent, ScrollBehavior, ScrollToOptions,
    Window,
};

use crate::actions::{add_class, load_image, start_counter};
use crate::config::{
    CounterConfig, LazyImageConfig, NavConfig, PageConfig, RevealConfig, CONFIG_ELEMENT_ID,
};
use crate::dom::{js_error, select_all, DomElement, DomTimers, DomViewport, ElementTable, Listener};
use crate::error::{RevealError, RevealResult};
use crate::nav::{self, SectionBounds};
use crate::scheduler::Scheduler;
use crate::surface::ClassList;
use crate::timer::Debouncer;
use crate::trigger::TriggerPolicy;
use crate::viewport::ElementId;

/// Sections prepared for a fade-in, kept so any still hidden at teardown can be shown.
struct Reveals {
    visible_class: String,
    targets: HashSet<ElementId>,
}

pub struct Page {
    scheduler: Scheduler<DomViewport>,
    elements: ElementTable,
    reveals: Reveals,
    listeners: Vec<Listener>,
}

impl Page {
    pub fn setup(window: &Window, document: &Document, config: PageConfig) -> RevealResult<Self> {
        let elements = ElementTable::new(document);
        let scheduler = Scheduler::new({
            let elements = elements.clone();
            move |sink| DomViewport::new(elements, sink)
        });
        let timers = DomTimers;

        let reveals = watch_reveals(&scheduler, &elements, document, &config.reveal)?;
        let counters = watch_counters(&scheduler, &elements, document, timers, &config.counters)?;
        let images = watch_lazy_images(&scheduler, &elements, document, &config.lazy_images)?;
        info!(
            "watching {} sections, {counters} counters, {images} lazy images",
            reveals.targets.len()
        );

        let mut listeners = smooth_scroll_links(window, document, &config.navigation)?;
        listeners.push(scroll_spy(window, document, timers, config.navigation)?);

        Ok(Self {
            scheduler,
            elements,
            reveals,
            listeners,
        })
    }

    /// Stop all observers, timers and listeners. Sections that never faded in
    /// are shown so no content stays hidden.
    pub fn teardown(self) {
        for id in self.scheduler.teardown() {
            if !self.reveals.targets.contains(&id) {
                continue;
            }
            let Some(target) = self.elements.get(id).map(DomElement) else {
                continue;
            };
            if let Err(err) = target.add_class(&self.reveals.visible_class) {
                warn!("element {id} left hidden: {err}");
            }
        }
        debug!("removing {} listeners", self.listeners.len());
    }
}

fn register(elements: &ElementTable, element: &Element, feature: &str) -> Option<ElementId> {
    match elements.register(element) {
        Ok(id) => Some(id),
        Err(err) => {
            warn!("skipping element for {feature}: {err}");
            None
        }
    }
}

fn checked(policy: TriggerPolicy, feature: &str) -> Option<TriggerPolicy> {
    match policy.observer_config() {
        Ok(_) => Some(policy),
        Err(err) => {
            warn!("{feature} disabled: {err}");
            None
        }
    }
}

fn watch_reveals(
    scheduler: &Scheduler<DomViewport>,
    elements: &ElementTable,
    document: &Document,
    config: &RevealConfig,
) -> RevealResult<Reveals> {
    let mut reveals = Reveals {
        visible_class: config.visible_class.clone(),
        targets: HashSet::new(),
    };
    if config.selectors.is_empty() {
        return Ok(reveals);
    }
    let policy = TriggerPolicy {
        threshold: config.threshold,
        root_margin: config.root_margin.clone(),
        repeat: config.repeat,
    };
    let Some(policy) = checked(policy, "fade-in reveals") else {
        return Ok(reveals);
    };

    for element in select_all(document, &config.selectors.join(", "))? {
        let Some(id) = register(elements, &element, "fade-in reveals") else {
            continue;
        };
        let target = DomElement(element);
        if let Err(err) = target.add_class(&config.prepare_class) {
            warn!("element {id} cannot fade in: {err}");
            continue;
        }
        let action = add_class(target.clone(), config.visible_class.clone());
        match scheduler.watch(id, policy.clone(), action) {
            Ok(_) => {
                reveals.targets.insert(id);
            }
            Err(err) => {
                warn!("not revealing element {id}: {err}");
                // prepared but unwatched would stay hidden
                if let Err(err) = target.remove_class(&config.prepare_class) {
                    warn!("element {id} left hidden: {err}");
                }
            }
        }
    }
    Ok(reveals)
}

fn watch_counters(
    scheduler: &Scheduler<DomViewport>,
    elements: &ElementTable,
    document: &Document,
    timers: DomTimers,
    config: &CounterConfig,
) -> RevealResult<usize> {
    let policy = TriggerPolicy::once(config.threshold).with_root_margin(config.root_margin.clone());
    let Some(policy) = checked(policy, "counters") else {
        return Ok(0);
    };

    let mut watched = 0;
    for element in select_all(document, &config.selector)? {
        let Some(id) = register(elements, &element, "counters") else {
            continue;
        };
        let action = start_counter(DomElement(element), timers, config.clone());
        match scheduler.watch(id, policy.clone(), action) {
            Ok(_) => watched += 1,
            Err(err) => warn!("not animating counter {id}: {err}"),
        }
    }
    Ok(watched)
}

fn watch_lazy_images(
    scheduler: &Scheduler<DomViewport>,
    elements: &ElementTable,
    document: &Document,
    config: &LazyImageConfig,
) -> RevealResult<usize> {
    let policy = TriggerPolicy::once(config.threshold).with_root_margin(config.root_margin.clone());
    let Some(policy) = checked(policy, "lazy images") else {
        return Ok(0);
    };

    let mut watched = 0;
    for image in select_all(document, &config.selector)? {
        let Some(id) = register(elements, &image, "lazy images") else {
            continue;
        };
        match scheduler.watch(id, policy.clone(), load_image(DomElement(image), config.clone())) {
            Ok(_) => watched += 1,
            Err(err) => warn!("not lazy loading image {id}: {err}"),
        }
    }
    Ok(watched)
}

fn scroll_to_id(window: &Window, document: &Document, id: &str, header_offset: f64) -> bool {
    let Some(target) = document.get_element_by_id(id) else {
        debug!("no section with id {id:?}");
        return false;
    };
    let Some(target) = target.dyn_ref::<HtmlElement>() else {
        return false;
    };
    let options = ScrollToOptions::new();
    options.set_top(nav::anchor_scroll_top(
        f64::from(target.offset_top()),
        header_offset,
    ));
    options.set_behavior(ScrollBehavior::Smooth);
    window.scroll_to_with_scroll_to_options(&options);
    true
}

fn smooth_scroll_links(
    window: &Window,
    document: &Document,
    config: &NavConfig,
) -> RevealResult<Vec<Listener>> {
    let mut listeners = Vec::new();
    for link in select_all(document, &config.anchor_selector)? {
        let window = window.clone();
        let document = document.clone();
        let header_offset = config.header_offset;
        let anchor = link.clone();
        listeners.push(Listener::new(&link, "click", move |event: Event| {
            event.prevent_default();
            let Some(href) = anchor.get_attribute("href") else {
                return;
            };
            if let Some(id) = nav::anchor_target(&href) {
                scroll_to_id(&window, &document, id, header_offset);
            }
        })?);
    }
    Ok(listeners)
}

fn highlight_nav(window: &Window, document: &Document, config: &NavConfig) {
    let scroll_y = window.scroll_y().unwrap_or(0.0);
    let sections: Vec<SectionBounds> = match select_all(document, &config.section_selector) {
        Ok(found) => found
            .into_iter()
            .filter_map(|section| section.dyn_into::<HtmlElement>().ok())
            .map(|section| SectionBounds::new(section.id(), f64::from(section.offset_top())))
            .collect(),
        Err(err) => {
            warn!("cannot read sections: {err}");
            return;
        }
    };
    let active = nav::active_section(scroll_y, &sections, config.spy_offset);

    let links = match select_all(document, &config.link_selector) {
        Ok(links) => links,
        Err(err) => {
            warn!("cannot read nav links: {err}");
            return;
        }
    };
    for link in links {
        let on = nav::is_active_link(link.get_attribute("href").as_deref(), active);
        if let Err(err) = link.class_list().toggle_with_force(&config.active_class, on) {
            warn!("{}", js_error("highlighting nav link", err));
        }
    }
}

fn scroll_spy(
    window: &Window,
    document: &Document,
    timers: DomTimers,
    config: NavConfig,
) -> RevealResult<Listener> {
    let config = Rc::new(config);
    highlight_nav(window, document, &config);

    let debouncer = Debouncer::new(timers, config.scroll_debounce_ms);
    let spy_window = window.clone();
    let spy_document = document.clone();
    Listener::new(window, "scroll", move |_: Event| {
        let window = spy_window.clone();
        let document = spy_document.clone();
        let config = config.clone();
        debouncer.call(move || highlight_nav(&window, &document, &config));
    })
}

fn load_config(document: &Document) -> PageConfig {
    let Some(block) = document.get_element_by_id(CONFIG_ELEMENT_ID) else {
        return PageConfig::default();
    };
    match PageConfig::from_json(&block.text_content().unwrap_or_default()) {
        Ok(config) => {
            debug!("loaded page config overrides");
            config
        }
        Err(err) => {
            warn!("ignoring page config: {err}");
            PageConfig::default()
        }
    }
}

fn start(window: &Window, document: &Document) -> RevealResult<()> {
    let page = Page::setup(window, document, load_config(document))?;
    let page = Rc::new(RefCell::new(Some(page)));

    // a persisted page goes into the back/forward cache and comes back as it was
    let on_hide = Closure::wrap(Box::new(move |event: Event| {
        let persisted = event
            .dyn_ref::<PageTransitionEvent>()
            .is_some_and(|event| event.persisted());
        if persisted {
            debug!("page cached, keeping it wired");
            return;
        }
        let page = page.borrow_mut().take();
        if let Some(page) = page {
            info!("page hidden, tearing down");
            page.teardown();
        }
    }) as Box<dyn FnMut(Event)>);
    window
        .add_event_listener_with_callback("pagehide", on_hide.as_ref().unchecked_ref())
        .map_err(|err| js_error("pagehide", err))?;
    on_hide.forget();
    Ok(())
}

/// Set the page up now, or once the document has finished parsing.
pub fn boot() -> RevealResult<()> {
    let window = web_sys::window().ok_or_else(|| RevealError::Dom("no window".to_string()))?;
    let document = window
        .document()
        .ok_or_else(|| RevealError::Dom("no document".to_string()))?;

    if document.ready_state() != "loading" {
        return start(&window, &document);
    }
    let target = document.clone();
    let ready = Closure::once_into_js(move |_: Event| {
        if let Err(err) = start(&window, &document) {
            warn!("page setup failed: {err}");
        }
    });
    target
        .add_event_listener_with_callback("DOMContentLoaded", ready.unchecked_ref())
        .map_err(|err| js_error("DOMContentLoaded", err))
}

/// Smooth-scroll to the section with `section_id`, for inline page handlers.
#[wasm_bindgen(js_name = scrollToSection)]
pub fn scroll_to_section(section_id: &str) -> bool {
    let Some(window) = web_sys::window() else {
        return false;
    };
    let Some(document) = window.document() else {
        return false;
    };
    scroll_to_id(&window, &document, section_id, NavConfig::default().header_offset)
}
