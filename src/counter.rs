//! Count-up animation for statistic figures.
//!
//! The figure already on the page is the target. Once started the text counts
//! up from zero in `steps` equal frames, each formatted with grouping
//! separators and a suffix, and lands exactly on the target.

use log::debug;

use crate::config::CounterConfig;
use crate::error::{RevealError, RevealResult};
use crate::surface::TextSlot;
use crate::timer::{TickFlow, Timers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterAnimation {
    target: u64,
    steps: u32,
    step: u32,
}

impl CounterAnimation {
    pub fn new(target: u64, steps: u32) -> Self {
        Self {
            target,
            steps: steps.max(1),
            step: 0,
        }
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    /// Value shown on the next frame, or `None` once the target has been shown.
    pub fn next_frame(&mut self) -> Option<u64> {
        if self.is_finished() {
            return None;
        }
        self.step += 1;
        let value = u128::from(self.target) * u128::from(self.step) / u128::from(self.steps);
        Some(value as u64)
    }

    pub fn is_finished(&self) -> bool {
        self.step >= self.steps
    }
}

/// Read the counter target from displayed text such as `"10,000+"`.
///
/// Grouping separators and surrounding whitespace are ignored, and anything
/// after the leading digits (a `+` suffix, a unit) is dropped.
pub fn parse_target(text: &str, separator: char) -> RevealResult<u64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != separator && !c.is_whitespace())
        .collect();
    let digits: String = cleaned
        .strip_prefix('+')
        .unwrap_or(&cleaned)
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        return Err(RevealError::InvalidInitialValue(text.to_string()));
    }
    digits
        .parse()
        .map_err(|_| RevealError::InvalidInitialValue(text.to_string()))
}

pub fn format_grouped(value: u64, separator: char) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}

pub fn counter_label(value: u64, config: &CounterConfig) -> String {
    format!("{}{}", format_grouped(value, config.separator), config.suffix)
}

/// Keeps a running counter alive. Dropping it cancels the remaining frames.
pub struct CounterGuard<H> {
    target: u64,
    timer: Option<H>,
}

impl<H> CounterGuard<H> {
    pub fn target(&self) -> u64 {
        self.target
    }

    /// `false` when the counter finished without needing a timer.
    pub fn is_scheduled(&self) -> bool {
        self.timer.is_some()
    }
}

/// Start counting `element` up to the number it currently shows.
pub fn animate_counter<E, T>(
    element: E,
    timers: &T,
    config: &CounterConfig,
) -> RevealResult<CounterGuard<T::Handle>>
where
    E: TextSlot + 'static,
    T: Timers,
{
    let target = parse_target(&element.text(), config.separator)?;
    if target == 0 {
        element.set_text(&counter_label(0, config));
        return Ok(CounterGuard {
            target,
            timer: None,
        });
    }

    debug!("counting up to {target} over {} frames", config.steps);
    let mut animation = CounterAnimation::new(target, config.steps);
    let config = config.clone();
    let timer = timers.every(
        config.frame_ms,
        Box::new(move || match animation.next_frame() {
            Some(value) => {
                element.set_text(&counter_label(value, &config));
                if animation.is_finished() {
                    TickFlow::Stop
                } else {
                    TickFlow::Continue
                }
            }
            None => TickFlow::Stop,
        }),
    );
    Ok(CounterGuard {
        target,
        timer: Some(timer),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeElement, ManualTimers};

    #[test]
    fn interpolates_linearly_to_exact_target() {
        let mut animation = CounterAnimation::new(1234, 125);
        let frames: Vec<u64> = std::iter::from_fn(|| animation.next_frame()).collect();
        assert_eq!(frames.len(), 125);
        assert_eq!(frames.first(), Some(&9));
        assert_eq!(frames.last(), Some(&1234));
        assert!(frames.windows(2).all(|w| w[0] <= w[1]));
        assert!(frames.iter().all(|v| *v <= 1234));
        assert!(animation.is_finished());
    }

    #[test]
    fn small_targets_hold_values_between_frames() {
        let mut animation = CounterAnimation::new(3, 125);
        let frames: Vec<u64> = std::iter::from_fn(|| animation.next_frame()).collect();
        assert_eq!(frames.len(), 125);
        assert_eq!(frames[0], 0);
        assert_eq!(frames[124], 3);
    }

    #[test]
    fn parses_displayed_figures() {
        assert_eq!(parse_target("1,234", ',').unwrap(), 1234);
        assert_eq!(parse_target(" 10,000+ ", ',').unwrap(), 10_000);
        assert_eq!(parse_target("50K", ',').unwrap(), 50);
        assert_eq!(parse_target("+7", ',').unwrap(), 7);
        assert_eq!(parse_target("0", ',').unwrap(), 0);
        assert_eq!(parse_target("1.500", '.').unwrap(), 1500);
    }

    #[test]
    fn rejects_non_numeric_text() {
        for text in ["", "lots", "-5", "  ", "99999999999999999999999"] {
            let err = parse_target(text, ',').unwrap_err();
            assert!(matches!(err, RevealError::InvalidInitialValue(_)), "{text:?}");
        }
    }

    #[test]
    fn formats_with_grouping() {
        assert_eq!(format_grouped(0, ','), "0");
        assert_eq!(format_grouped(999, ','), "999");
        assert_eq!(format_grouped(1000, ','), "1,000");
        assert_eq!(format_grouped(1_234_567, ','), "1,234,567");
        assert_eq!(format_grouped(12_345, ' '), "12 345");
        assert_eq!(counter_label(1234, &CounterConfig::default()), "1,234+");
    }

    #[test]
    fn animates_element_within_frame_budget() {
        let timers = ManualTimers::new();
        let element = FakeElement::with_text("1,234");
        let config = CounterConfig::default();
        let guard = animate_counter(element.clone(), &timers, &config).unwrap();
        assert!(guard.is_scheduled());
        assert_eq!(element.text(), "1,234");

        timers.advance(16);
        assert_eq!(element.text(), "9+");

        timers.advance(16 * 124);
        assert_eq!(element.text(), "1,234+");
        assert_eq!(element.text_writes(), 125);
        assert_eq!(timers.pending(), 0);

        let shown: Vec<u64> = element
            .text_history()
            .iter()
            .map(|t| parse_target(t, ',').unwrap())
            .collect();
        assert!(shown.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn zero_target_finishes_immediately() {
        let timers = ManualTimers::new();
        let element = FakeElement::with_text("0");
        let guard = animate_counter(element.clone(), &timers, &CounterConfig::default()).unwrap();
        assert!(!guard.is_scheduled());
        assert_eq!(element.text(), "0+");
        assert_eq!(timers.pending(), 0);
    }

    #[test]
    fn dropping_guard_cancels_remaining_frames() {
        let timers = ManualTimers::new();
        let element = FakeElement::with_text("5,000");
        let guard = animate_counter(element.clone(), &timers, &CounterConfig::default()).unwrap();
        timers.advance(16 * 10);
        let frozen = element.text();
        drop(guard);
        timers.advance(16 * 200);
        assert_eq!(element.text(), frozen);
        assert_eq!(element.text_writes(), 10);
    }

    #[test]
    fn malformed_text_is_left_alone() {
        let timers = ManualTimers::new();
        let element = FakeElement::with_text("many");
        let err = animate_counter(element.clone(), &timers, &CounterConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, RevealError::InvalidInitialValue(_)));
        assert_eq!(element.text(), "many");
        assert_eq!(timers.pending(), 0);
    }
}
