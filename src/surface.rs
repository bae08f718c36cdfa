//! What reveal actions are allowed to touch on an element.

use crate::error::RevealResult;

pub trait ClassList {
    fn add_class(&self, class: &str) -> RevealResult<()>;
    fn remove_class(&self, class: &str) -> RevealResult<()>;
    fn has_class(&self, class: &str) -> bool;
}

pub trait TextSlot {
    fn text(&self) -> String;
    fn set_text(&self, text: &str);
}

pub trait ImageSource {
    fn attribute(&self, name: &str) -> Option<String>;
    fn set_source(&self, src: &str) -> RevealResult<()>;
}
