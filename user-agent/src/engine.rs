// src/engine.rs

//! Detection engine seam.
//!
//! Rule evaluation is external to the agent core. A [`Classifier`] turns an
//! enriched event into an optional [`Detection`]; the [`ActionPolicy`] then
//! decides which responses the detection gets.

use crate::actions::Action;
use crate::config::model::ActionsConfig;
use crate::event::{Detection, Event};

pub trait Classifier: Send + Sync {
    fn classify(&self, ev: &Event) -> Option<Detection>;
}

/// For telemetry that already went through a rule engine: the verdict is
/// read from the event's own `Detection` section.
#[derive(Debug, Default)]
pub struct EmbeddedDetection;

impl Classifier for EmbeddedDetection {
    fn classify(&self, ev: &Event) -> Option<Detection> {
        ev.detection().cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Low,
    Medium,
    High,
    Critical,
}

impl Tier {
    pub fn of(criticality: i64) -> Self {
        match criticality {
            i64::MIN..=4 => Tier::Low,
            5..=6 => Tier::Medium,
            7..=8 => Tier::High,
            _ => Tier::Critical,
        }
    }
}

/// Criticality based response selection.
#[derive(Debug, Clone)]
pub struct ActionPolicy {
    threshold: i64,
    low:       Vec<Action>,
    medium:    Vec<Action>,
    high:      Vec<Action>,
    critical:  Vec<Action>,
}

impl From<&ActionsConfig> for ActionPolicy {
    fn from(cfg: &ActionsConfig) -> Self {
        Self {
            threshold: cfg.threshold,
            low:       cfg.low.clone(),
            medium:    cfg.medium.clone(),
            high:      cfg.high.clone(),
            critical:  cfg.critical.clone(),
        }
    }
}

impl ActionPolicy {
    pub fn defaults(&self, tier: Tier) -> &[Action] {
        match tier {
            Tier::Low => &self.low,
            Tier::Medium => &self.medium,
            Tier::High => &self.high,
            Tier::Critical => &self.critical,
        }
    }

    /// Below the threshold a detection gets no response at all. A detection
    /// without explicit actions gets the defaults of its tier.
    pub fn apply(&self, det: &mut Detection) {
        if det.criticality < self.threshold {
            det.actions.clear();
            return;
        }
        if det.actions.is_empty() {
            det.actions = self
                .defaults(Tier::of(det.criticality))
                .iter()
                .map(|a| a.as_str().to_string())
                .collect();
        }
    }
}
