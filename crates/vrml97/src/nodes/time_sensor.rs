use std::rc::Rc;

use log::trace;

use crate::engine::NodeId;
use crate::error::Result;
use crate::field::{FieldType, FieldValue};
use crate::node::{BuiltinMetatype, NodeBehavior, NodeInterface, NodeMetatype, NodeState, TimeDependent};
use crate::scene::Scene;

const EPSILON: f64 = 1e-9;

pub(super) fn time_sensor() -> Rc<dyn NodeMetatype> {
    BuiltinMetatype::builder("TimeSensor")
        .exposed_field("cycleInterval", FieldValue::SfTime(1.0))
        .exposed_field("enabled", FieldValue::SfBool(true))
        .exposed_field("loop", FieldValue::SfBool(false))
        .exposed_field("startTime", FieldValue::SfTime(0.0))
        .exposed_field("stopTime", FieldValue::SfTime(0.0))
        .event_out("cycleTime", FieldType::SfTime)
        .event_out("fraction_changed", FieldType::SfFloat)
        .event_out("isActive", FieldType::SfBool)
        .event_out("time", FieldType::SfTime)
        .behavior(TimeSensor)
        .build()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSensorState {
    pub active: bool,
    /// Time of the previous update; a startTime before it never activates
    /// the sensor.
    pub last_time: f64,
}

impl Default for TimeSensorState {
    fn default() -> Self {
        Self {
            active: false,
            last_time: -1.0,
        }
    }
}

struct TimeSensor;

/// Field values read at the start of an update.
struct Timing {
    enabled: bool,
    looping: bool,
    interval: f64,
    start: f64,
    stop: f64,
}

impl TimeSensor {
    fn state(scene: &Scene, node: NodeId) -> TimeSensorState {
        match scene.node(node).map(|sensor| sensor.state()) {
            Ok(NodeState::TimeSensor(state)) => state.clone(),
            _ => TimeSensorState::default(),
        }
    }

    fn timing(scene: &Scene, node: NodeId) -> Result<Timing> {
        let sensor = scene.node(node)?;
        Ok(Timing {
            enabled: sensor.bool_or("enabled", true),
            looping: sensor.bool_or("loop", false),
            interval: sensor.time_or("cycleInterval", 1.0),
            start: sensor.time_or("startTime", 0.0),
            stop: sensor.time_or("stopTime", 0.0),
        })
    }

    /// Fraction of the current cycle at `time`; a completed cycle is 1.
    fn fraction(timing: &Timing, time: f64) -> f32 {
        let f = if timing.interval > 0.0 && time > timing.start {
            (time - timing.start) % timing.interval
        } else {
            0.0
        };
        if f.abs() < EPSILON { 1.0 } else { (f / timing.interval) as f32 }
    }

    /// When an active sensor stops: after one cycle unless looping, or at a
    /// stopTime later than startTime, whichever comes first.
    fn end_time(timing: &Timing) -> Option<f64> {
        let single_cycle = (!timing.looping).then_some(timing.start + timing.interval);
        let stop = (timing.stop > timing.start).then_some(timing.stop);
        match (single_cycle, stop) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn deactivate_now(scene: &mut Scene, node: NodeId, timestamp: f64) -> Result<()> {
        let timing = Self::timing(scene, node)?;
        let last = scene.event_value(node, "time")?.as_time().unwrap_or(timestamp);
        let f = if timing.interval > 0.0 {
            (last - timing.start) % timing.interval
        } else {
            0.0
        };
        let fraction = if f.abs() < EPSILON { 1.0 } else { (f / timing.interval) as f32 };
        scene.emit_event(node, "time", FieldValue::SfTime(timestamp), timestamp)?;
        scene.emit_event(node, "fraction_changed", FieldValue::SfFloat(fraction), timestamp)?;
        scene.emit_event(node, "isActive", FieldValue::SfBool(false), timestamp)?;
        scene.set_state(
            node,
            NodeState::TimeSensor(TimeSensorState {
                active: false,
                last_time: timestamp,
            }),
        )
    }
}

impl NodeBehavior for TimeSensor {
    fn initialize(&self, scene: &mut Scene, node: NodeId, _timestamp: f64) -> Result<()> {
        scene.set_state(node, NodeState::TimeSensor(TimeSensorState::default()))?;
        scene.add_time_dependent(node);
        Ok(())
    }

    fn shutdown(&self, scene: &mut Scene, node: NodeId, _timestamp: f64) {
        scene.remove_time_dependent(node);
    }

    fn process_event(
        &self,
        scene: &mut Scene,
        node: NodeId,
        interface: &NodeInterface,
        value: FieldValue,
        timestamp: f64,
    ) -> Result<()> {
        let mut state = Self::state(scene, node);
        match interface.id.as_str() {
            // Ignored while running
            "cycleInterval" | "startTime" => {
                if state.active {
                    trace!("{node} is active, ignoring {}", interface.id);
                    return Ok(());
                }
                state.last_time = timestamp;
                scene.set_state(node, NodeState::TimeSensor(state))?;
                scene.apply_event(node, interface, value, timestamp)
            }
            "enabled" => {
                let enabled = value.as_bool().unwrap_or(true);
                scene.apply_event(node, interface, value, timestamp)?;
                if !enabled && state.active {
                    Self::deactivate_now(scene, node, timestamp)?;
                }
                Ok(())
            }
            _ => scene.apply_event(node, interface, value, timestamp),
        }
    }

    fn as_time_dependent(&self) -> Option<&dyn TimeDependent> {
        Some(self)
    }
}

impl TimeDependent for TimeSensor {
    fn update(&self, scene: &mut Scene, node: NodeId, time: f64) -> Result<()> {
        let timing = Self::timing(scene, node)?;
        if !timing.enabled {
            return Ok(());
        }
        let mut state = Self::state(scene, node);
        if state.last_time > time {
            state.last_time = time;
        }

        if !state.active {
            let stop_pending = timing.stop < timing.start || timing.stop > time;
            if timing.start <= time && timing.start >= state.last_time && (stop_pending || timing.looping) {
                state.active = true;
                scene.emit_event(node, "isActive", FieldValue::SfBool(true), time)?;
                scene.emit_event(node, "time", FieldValue::SfTime(time), time)?;
                scene.emit_event(node, "fraction_changed", FieldValue::SfFloat(0.0), time)?;
                scene.emit_event(node, "cycleTime", FieldValue::SfTime(time), time)?;
            }
        } else {
            let end = Self::end_time(&timing).filter(|end| *end <= time + EPSILON);
            let now = end.unwrap_or(time);
            let fraction = Self::fraction(&timing, now);
            scene.emit_event(node, "fraction_changed", FieldValue::SfFloat(fraction), now)?;
            scene.emit_event(node, "time", FieldValue::SfTime(now), now)?;
            if fraction == 1.0 {
                scene.emit_event(node, "cycleTime", FieldValue::SfTime(now), now)?;
            }
            if end.is_some() {
                state.active = false;
                scene.emit_event(node, "isActive", FieldValue::SfBool(false), now)?;
            }
        }

        state.last_time = time;
        scene.set_state(node, NodeState::TimeSensor(state))
    }
}
