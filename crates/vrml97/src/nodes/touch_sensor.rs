use std::rc::Rc;

use crate::engine::NodeId;
use crate::error::Result;
use crate::field::{FieldType, FieldValue, Vec3f};
use crate::node::{BuiltinMetatype, NodeBehavior, NodeMetatype, NodeState, PointingDeviceSensor};
use crate::scene::Scene;

pub(super) fn touch_sensor() -> Rc<dyn NodeMetatype> {
    BuiltinMetatype::builder("TouchSensor")
        .exposed_field("enabled", FieldValue::SfBool(true))
        .event_out("hitNormal_changed", FieldType::SfVec3f)
        .event_out("hitPoint_changed", FieldType::SfVec3f)
        .event_out("hitTexCoord_changed", FieldType::SfVec2f)
        .event_out("isActive", FieldType::SfBool)
        .event_out("isOver", FieldType::SfBool)
        .event_out("touchTime", FieldType::SfTime)
        .behavior(TouchSensor)
        .build()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TouchSensorState {
    pub over: bool,
    pub active: bool,
}

struct TouchSensor;

impl NodeBehavior for TouchSensor {
    fn as_pointing_device_sensor(&self) -> Option<&dyn PointingDeviceSensor> {
        Some(self)
    }
}

impl PointingDeviceSensor for TouchSensor {
    fn activate(
        &self,
        scene: &mut Scene,
        node: NodeId,
        timestamp: f64,
        over: bool,
        active: bool,
        hit_point: Vec3f,
    ) -> Result<()> {
        let sensor = scene.node(node)?;
        if !sensor.bool_or("enabled", true) {
            return Ok(());
        }
        let previous = match sensor.state() {
            NodeState::TouchSensor(state) => state.clone(),
            _ => TouchSensorState::default(),
        };

        // A click is a release while still over the geometry
        if over && !active && previous.active {
            scene.emit_event(node, "touchTime", FieldValue::SfTime(timestamp), timestamp)?;
        }
        if over {
            scene.emit_event(node, "hitPoint_changed", FieldValue::SfVec3f(hit_point), timestamp)?;
        }
        if over != previous.over {
            scene.emit_event(node, "isOver", FieldValue::SfBool(over), timestamp)?;
        }
        if active != previous.active {
            scene.emit_event(node, "isActive", FieldValue::SfBool(active), timestamp)?;
        }
        scene.set_state(node, NodeState::TouchSensor(TouchSensorState { over, active }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrowserConfig;
    use crate::node::{Capability, MetatypeRegistry};
    use crate::viewer::{RecordingViewer, ViewerCall};

    const BUTTON: &str = "#VRML V2.0 utf8\n\
        DEF Button Group { children [\n\
          DEF Touch TouchSensor { }\n\
          Shape { geometry Box { } }\n\
        ] }";

    fn load() -> (Scene, NodeId, NodeId) {
        let scene =
            Scene::load(BUTTON, "test.wrl", MetatypeRegistry::with_builtins(), BrowserConfig::default()).unwrap();
        let button = scene.find_node("Button").unwrap();
        let touch = scene.find_node("Touch").unwrap();
        (scene, button, touch)
    }

    fn value(scene: &Scene, touch: NodeId, event_out: &str) -> FieldValue {
        scene.event_value(touch, event_out).unwrap().clone()
    }

    #[test]
    fn sensor_groups_render_as_sensitive() {
        let (mut scene, button, touch) = load();
        assert!(scene.has_capability(touch, Capability::PointingDeviceSensor));
        let mut viewer = RecordingViewer::new();
        scene.render(&mut viewer);
        assert!(viewer.calls().contains(&ViewerCall::SetSensitive {
            node: Some(button.to_string())
        }));
    }

    #[test]
    fn press_and_release_over_geometry_is_a_touch() {
        let (mut scene, button, touch) = load();
        let hit = Vec3f::new(0.0, 1.0, 0.0);

        scene.sensitive_event(button, 1.0, true, false, hit).unwrap();
        assert_eq!(value(&scene, touch, "isOver"), FieldValue::SfBool(true));
        assert_eq!(value(&scene, touch, "hitPoint_changed"), FieldValue::SfVec3f(hit));

        scene.sensitive_event(button, 2.0, true, true, hit).unwrap();
        assert_eq!(value(&scene, touch, "isActive"), FieldValue::SfBool(true));
        assert_eq!(value(&scene, touch, "touchTime"), FieldValue::SfTime(0.0));

        scene.sensitive_event(button, 3.0, true, false, hit).unwrap();
        assert_eq!(value(&scene, touch, "isActive"), FieldValue::SfBool(false));
        assert_eq!(value(&scene, touch, "touchTime"), FieldValue::SfTime(3.0));
    }

    #[test]
    fn release_elsewhere_is_not_a_touch() {
        let (mut scene, button, touch) = load();
        scene.sensitive_event(button, 1.0, true, true, Vec3f::ZERO).unwrap();
        scene.sensitive_event(button, 2.0, false, false, Vec3f::ZERO).unwrap();
        assert_eq!(value(&scene, touch, "isOver"), FieldValue::SfBool(false));
        assert_eq!(value(&scene, touch, "touchTime"), FieldValue::SfTime(0.0));
    }

    #[test]
    fn disabled_sensors_ignore_the_pointer() {
        let (mut scene, button, touch) = load();
        scene.set_field(touch, "enabled", FieldValue::SfBool(false)).unwrap();
        scene.sensitive_event(button, 1.0, true, true, Vec3f::ZERO).unwrap();
        assert_eq!(value(&scene, touch, "isActive"), FieldValue::SfBool(false));
    }
}
