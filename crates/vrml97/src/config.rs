use serde::{Deserialize, Serialize};

/// Tunables for a [`crate::Browser`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Deepest chain of route deliveries allowed within one timestamp.
    /// Emissions beyond it are dropped and the pass is reported as truncated.
    pub max_cascade_depth: usize,
    /// Upper limit on deliveries within one processing pass.
    pub max_events_per_pass: usize,
    /// VRML97 4.10.4: an eventOut sends at most one event per timestamp.
    pub one_event_per_eventout: bool,
    /// Seconds between frames for hosts that drive `update` on a fixed clock.
    pub frame_interval: f64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            max_cascade_depth: 64,
            max_events_per_pass: 65_536,
            one_event_per_eventout: false,
            frame_interval: 1.0 / 60.0,
        }
    }
}
