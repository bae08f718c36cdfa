use std::any::Any;

use crate::config::{CounterConfig, LazyImageConfig};
use crate::counter::animate_counter;
use crate::error::{RevealError, RevealResult};
use crate::surface::{ClassList, ImageSource, TextSlot};
use crate::timer::Timers;
use crate::viewport::ElementId;

/// One run of an action, for one element.
///
/// Anything passed to [`Firing::hold`] stays alive until the element's
/// subscription is released, then is dropped.
pub struct Firing {
    element: ElementId,
    held: Vec<Box<dyn Any>>,
}

impl Firing {
    pub fn new(element: ElementId) -> Self {
        Self {
            element,
            held: Vec::new(),
        }
    }

    pub fn element(&self) -> ElementId {
        self.element
    }

    pub fn hold<R: 'static>(&mut self, resource: R) {
        self.held.push(Box::new(resource));
    }

    pub fn into_held(self) -> Vec<Box<dyn Any>> {
        self.held
    }
}

pub trait RevealAction {
    fn run(&self, firing: &mut Firing) -> RevealResult<()>;
}

impl<F> RevealAction for F
where
    F: Fn(&mut Firing) -> RevealResult<()>,
{
    fn run(&self, firing: &mut Firing) -> RevealResult<()> {
        self(firing)
    }
}

pub fn add_class<E>(element: E, class: impl Into<String>) -> impl RevealAction
where
    E: ClassList + 'static,
{
    let class = class.into();
    move |_: &mut Firing| -> RevealResult<()> { element.add_class(&class) }
}

pub fn start_counter<E, T>(element: E, timers: T, config: CounterConfig) -> impl RevealAction
where
    E: TextSlot + Clone + 'static,
    T: Timers,
{
    move |firing: &mut Firing| -> RevealResult<()> {
        let guard = animate_counter(element.clone(), &timers, &config)?;
        firing.hold(guard);
        Ok(())
    }
}

/// Swap in the real image source kept in an attribute and drop the placeholder class.
pub fn load_image<E>(image: E, config: LazyImageConfig) -> impl RevealAction
where
    E: ImageSource + ClassList + 'static,
{
    move |_: &mut Firing| -> RevealResult<()> {
        let src = image.attribute(&config.source_attribute).ok_or_else(|| {
            RevealError::Dom(format!("image has no {} attribute", config.source_attribute))
        })?;
        image.set_source(&src)?;
        image.remove_class(&config.lazy_class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeElement, ManualTimers};

    #[test]
    fn add_class_marks_element() {
        let element = FakeElement::new();
        let action = add_class(element.clone(), "visible");
        action.run(&mut Firing::new(ElementId(1))).unwrap();
        assert!(element.has_class("visible"));
    }

    #[test]
    fn load_image_swaps_source() {
        let image = FakeElement::new()
            .with_attribute("data-src", "/img/donors.jpg")
            .with_class("lazy");
        let action = load_image(image.clone(), LazyImageConfig::default());
        action.run(&mut Firing::new(ElementId(2))).unwrap();
        assert_eq!(image.source().as_deref(), Some("/img/donors.jpg"));
        assert!(!image.has_class("lazy"));
    }

    #[test]
    fn load_image_without_source_fails() {
        let image = FakeElement::new().with_class("lazy");
        let action = load_image(image.clone(), LazyImageConfig::default());
        let err = action.run(&mut Firing::new(ElementId(3))).unwrap_err();
        assert!(matches!(err, RevealError::Dom(_)));
        assert!(image.has_class("lazy"));
    }

    #[test]
    fn counter_hands_its_timer_to_the_firing() {
        let timers = ManualTimers::new();
        let element = FakeElement::with_text("250");
        let action = start_counter(element.clone(), timers.clone(), CounterConfig::default());
        let mut firing = Firing::new(ElementId(4));
        action.run(&mut firing).unwrap();
        let held = firing.into_held();
        assert_eq!(held.len(), 1);
        assert_eq!(timers.pending(), 1);
        drop(held);
        assert_eq!(timers.pending(), 0);
    }
}
