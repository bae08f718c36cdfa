use crate::error::RevealResult;
use crate::viewport::{ObserverConfig, VisibilityChange};

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerPolicy {
    pub threshold: f64,
    pub root_margin: String,
    pub repeat: bool,
}

impl TriggerPolicy {
    /// Fire the first time the element becomes visible, then stop watching.
    pub fn once(threshold: f64) -> Self {
        Self {
            threshold,
            root_margin: "0px".to_string(),
            repeat: false,
        }
    }

    /// Fire every time the element comes back into view.
    pub fn repeating(threshold: f64) -> Self {
        Self {
            repeat: true,
            ..Self::once(threshold)
        }
    }

    pub fn with_root_margin(mut self, root_margin: impl Into<String>) -> Self {
        self.root_margin = root_margin.into();
        self
    }

    pub fn observer_config(&self) -> RevealResult<ObserverConfig> {
        ObserverConfig::new(self.threshold, self.root_margin.clone())
    }

    /// Intersecting and at or above the threshold; no slack below it.
    pub fn is_visible(&self, change: &VisibilityChange) -> bool {
        change.intersecting && change.ratio >= self.threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerState {
    #[default]
    Pending,
    Fired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Pending -> Fired: run the action.
    Fire,
    /// Fired -> Pending: only for repeating policies.
    Rearm,
    Stay,
}

impl TriggerState {
    pub fn advance(&mut self, policy: &TriggerPolicy, change: &VisibilityChange) -> Transition {
        let visible = policy.is_visible(change);
        match (*self, visible) {
            (TriggerState::Pending, true) => {
                *self = TriggerState::Fired;
                Transition::Fire
            }
            (TriggerState::Fired, false) if policy.repeat => {
                *self = TriggerState::Pending;
                Transition::Rearm
            }
            _ => Transition::Stay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewport::ElementId;

    fn at(ratio: f64) -> VisibilityChange {
        VisibilityChange::new(ElementId(1), ratio)
    }

    #[test]
    fn once_fires_on_first_entry_only() {
        let policy = TriggerPolicy::once(0.1);
        let mut state = TriggerState::default();
        assert_eq!(state.advance(&policy, &at(0.05)), Transition::Stay);
        assert_eq!(state.advance(&policy, &at(0.5)), Transition::Fire);
        assert_eq!(state.advance(&policy, &at(0.0)), Transition::Stay);
        assert_eq!(state.advance(&policy, &at(0.8)), Transition::Stay);
        assert_eq!(state, TriggerState::Fired);
    }

    #[test]
    fn repeating_rearms_when_leaving_view() {
        let policy = TriggerPolicy::repeating(0.5);
        let mut state = TriggerState::default();
        let transitions: Vec<_> = [0.6, 0.7, 0.2, 0.0, 0.9, 0.1]
            .into_iter()
            .map(|ratio| state.advance(&policy, &at(ratio)))
            .collect();
        assert_eq!(
            transitions,
            vec![
                Transition::Fire,
                Transition::Stay,
                Transition::Rearm,
                Transition::Stay,
                Transition::Fire,
                Transition::Rearm,
            ]
        );
    }

    #[test]
    fn zero_threshold_needs_an_intersection() {
        let policy = TriggerPolicy::once(0.0);
        let mut state = TriggerState::default();
        assert_eq!(state.advance(&policy, &at(0.0)), Transition::Stay);
        assert_eq!(state.advance(&policy, &at(0.01)), Transition::Fire);
    }

    #[test]
    fn ratio_just_below_threshold_is_not_visible() {
        let policy = TriggerPolicy::once(0.5);
        let change = VisibilityChange {
            element: ElementId(1),
            ratio: 0.4999,
            intersecting: true,
        };
        assert!(!policy.is_visible(&change));
        assert!(policy.is_visible(&at(0.5)));

        let mut state = TriggerState::default();
        assert_eq!(state.advance(&policy, &change), Transition::Stay);
        assert_eq!(state, TriggerState::Pending);
    }

    #[test]
    fn repeating_rearms_just_below_threshold() {
        let policy = TriggerPolicy::repeating(0.5);
        let mut state = TriggerState::default();
        assert_eq!(state.advance(&policy, &at(0.5)), Transition::Fire);
        assert_eq!(state.advance(&policy, &at(0.4999)), Transition::Rearm);
    }

    #[test]
    fn root_margin_flows_into_observer_config() {
        let config = TriggerPolicy::once(0.1)
            .with_root_margin("0px 0px -50px 0px")
            .observer_config()
            .unwrap();
        assert_eq!(config.root_margin, "0px 0px -50px 0px");
        assert_eq!(config.threshold.ratio(), 0.1);
        assert!(TriggerPolicy::repeating(1.5).observer_config().is_err());
    }
}
