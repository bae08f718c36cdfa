use log::Level;
use serde::Deserialize;

use crate::error::RevealResult;

#[cfg(debug_assertions)]
pub fn log_level() -> Level {
    Level::Debug // Verbose console output while developing locally
}

#[cfg(not(debug_assertions))]
pub fn log_level() -> Level {
    Level::Info
}

/// Id of the optional `<script type="application/json">` block holding overrides.
pub const CONFIG_ELEMENT_ID: &str = "page-config";

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageConfig {
    pub reveal: RevealConfig,
    pub counters: CounterConfig,
    pub lazy_images: LazyImageConfig,
    pub navigation: NavConfig,
}

impl PageConfig {
    pub fn from_json(json: &str) -> RevealResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Fade-in sections.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RevealConfig {
    pub selectors: Vec<String>,
    pub threshold: f64,
    pub root_margin: String,
    pub prepare_class: String,
    pub visible_class: String,
    pub repeat: bool,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            selectors: [
                ".service-card",
                ".benefit-item",
                ".contact-item",
                ".about-content",
                ".donation-form-container",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            threshold: 0.1,
            root_margin: "0px 0px -50px 0px".to_string(),
            prepare_class: "fade-in".to_string(),
            visible_class: "visible".to_string(),
            repeat: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CounterConfig {
    pub selector: String,
    pub threshold: f64,
    pub root_margin: String,
    pub steps: u32,
    pub frame_ms: u32,
    pub suffix: String,
    pub separator: char,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            selector: ".stat-item h3".to_string(),
            threshold: 0.5,
            root_margin: "0px".to_string(),
            steps: 125,
            frame_ms: 16,
            suffix: "+".to_string(),
            separator: ',',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LazyImageConfig {
    pub selector: String,
    pub threshold: f64,
    pub root_margin: String,
    pub source_attribute: String,
    pub lazy_class: String,
}

impl Default for LazyImageConfig {
    fn default() -> Self {
        Self {
            selector: "img[data-src]".to_string(),
            threshold: 0.0,
            root_margin: "0px".to_string(),
            source_attribute: "data-src".to_string(),
            lazy_class: "lazy".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NavConfig {
    pub section_selector: String,
    pub link_selector: String,
    pub anchor_selector: String,
    pub active_class: String,
    /// How far above a section's top the scroll position may be and still count as inside it.
    pub spy_offset: f64,
    /// Height of the fixed header that anchor scrolling leaves uncovered.
    pub header_offset: f64,
    pub scroll_debounce_ms: u32,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            section_selector: "section[id]".to_string(),
            link_selector: ".nav-link".to_string(),
            anchor_selector: "a[href^=\"#\"]".to_string(),
            active_class: "active".to_string(),
            spy_offset: 200.0,
            header_offset: 80.0,
            scroll_debounce_ms: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RevealError;

    #[test]
    fn defaults_match_page_script() {
        let config = PageConfig::default();
        assert_eq!(config.reveal.threshold, 0.1);
        assert_eq!(config.reveal.root_margin, "0px 0px -50px 0px");
        assert_eq!(config.reveal.selectors.len(), 5);
        assert!(!config.reveal.repeat);
        assert_eq!(config.counters.threshold, 0.5);
        assert_eq!(config.counters.steps, 125);
        assert_eq!(config.counters.frame_ms, 16);
        assert_eq!(config.lazy_images.threshold, 0.0);
        assert_eq!(config.navigation.header_offset, 80.0);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            PageConfig::from_json(r#"{"counters": {"steps": 60, "suffix": ""}, "reveal": {"repeat": true}}"#)
                .unwrap();
        assert_eq!(config.counters.steps, 60);
        assert_eq!(config.counters.suffix, "");
        assert_eq!(config.counters.frame_ms, 16);
        assert!(config.reveal.repeat);
        assert_eq!(config.reveal.visible_class, "visible");
        assert_eq!(config.navigation, NavConfig::default());
    }

    #[test]
    fn malformed_json_is_config_error() {
        let err = PageConfig::from_json("{\"reveal\": ").unwrap_err();
        assert!(matches!(err, RevealError::Config(_)));
    }
}
