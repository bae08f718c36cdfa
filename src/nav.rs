//! Scroll position maths for the navigation bar.

#[derive(Debug, Clone, PartialEq)]
pub struct SectionBounds {
    pub id: String,
    pub offset_top: f64,
}

impl SectionBounds {
    pub fn new(id: impl Into<String>, offset_top: f64) -> Self {
        Self {
            id: id.into(),
            offset_top,
        }
    }
}

/// The section the reader is in: the last one, in document order, whose top
/// minus `spy_offset` has been scrolled past.
pub fn active_section(scroll_y: f64, sections: &[SectionBounds], spy_offset: f64) -> Option<&str> {
    sections
        .iter()
        .rev()
        .find(|section| scroll_y >= section.offset_top - spy_offset)
        .map(|section| section.id.as_str())
}

/// Whether a nav link pointing at `href` should be highlighted.
pub fn is_active_link(href: Option<&str>, active: Option<&str>) -> bool {
    match (href.and_then(|h| h.strip_prefix('#')), active) {
        (Some(target), Some(active)) => target == active,
        _ => false,
    }
}

/// Scroll offset that puts an element at `offset_top` just under the fixed header.
pub fn anchor_scroll_top(offset_top: f64, header_offset: f64) -> f64 {
    (offset_top - header_offset).max(0.0)
}

/// Fragment targets worth resolving; a bare `#` has no target.
pub fn anchor_target(href: &str) -> Option<&str> {
    href.strip_prefix('#').filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Vec<SectionBounds> {
        vec![
            SectionBounds::new("home", 0.0),
            SectionBounds::new("about", 800.0),
            SectionBounds::new("donate", 1600.0),
            SectionBounds::new("contact", 2400.0),
        ]
    }

    #[test]
    fn picks_last_section_scrolled_into() {
        let sections = page();
        assert_eq!(active_section(0.0, &sections, 200.0), Some("home"));
        assert_eq!(active_section(599.0, &sections, 200.0), Some("home"));
        assert_eq!(active_section(600.0, &sections, 200.0), Some("about"));
        assert_eq!(active_section(1500.0, &sections, 200.0), Some("donate"));
        assert_eq!(active_section(9000.0, &sections, 200.0), Some("contact"));
    }

    #[test]
    fn no_section_before_the_first() {
        let sections = vec![SectionBounds::new("about", 900.0)];
        assert_eq!(active_section(100.0, &sections, 200.0), None);
        assert_eq!(active_section(0.0, &[], 200.0), None);
    }

    #[test]
    fn highlights_matching_links_only() {
        assert!(is_active_link(Some("#about"), Some("about")));
        assert!(!is_active_link(Some("#about"), Some("donate")));
        assert!(!is_active_link(Some("about"), Some("about")));
        assert!(!is_active_link(None, Some("about")));
        assert!(!is_active_link(Some("#"), None));
    }

    #[test]
    fn anchors_clear_the_header() {
        assert_eq!(anchor_scroll_top(1600.0, 80.0), 1520.0);
        assert_eq!(anchor_scroll_top(20.0, 80.0), 0.0);
        assert_eq!(anchor_target("#donate"), Some("donate"));
        assert_eq!(anchor_target("#"), None);
        assert_eq!(anchor_target("/faq"), None);
    }
}
