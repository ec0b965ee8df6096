//! The interface between the scene graph and a rendering backend.

use glam::Mat4;
use serde::Serialize;

use crate::engine::arena::NodeId;
use crate::field::{Color, Rotation, Vec3f};

/// Viewer-side object produced by an insert call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ObjectHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialProperties {
    pub ambient_intensity: f32,
    pub diffuse_color: Color,
    pub emissive_color: Color,
    pub shininess: f32,
    pub specular_color: Color,
    pub transparency: f32,
}

impl Default for MaterialProperties {
    fn default() -> Self {
        Self {
            ambient_intensity: 0.2,
            diffuse_color: Color::new(0.8, 0.8, 0.8),
            emissive_color: Color::BLACK,
            shininess: 0.2,
            specular_color: Color::BLACK,
            transparency: 0.0,
        }
    }
}

/// A cone of light; angles in radians.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpotLightProperties {
    pub ambient_intensity: f32,
    pub attenuation: Vec3f,
    pub beam_width: f32,
    pub color: Color,
    pub cut_off_angle: f32,
    pub direction: Vec3f,
    pub intensity: f32,
    pub location: Vec3f,
    pub radius: f32,
}

/// Indexed polygon mesh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Shell {
    pub points: Vec<Vec3f>,
    /// Vertex indices, faces separated by -1.
    pub coord_index: Vec<i32>,
    pub ccw: bool,
    pub convex: bool,
    pub solid: bool,
}

/// Rendering backend driven by the render traversal.
pub trait Viewer {
    fn begin_object(&mut self, name: Option<&str>) -> ObjectHandle;
    fn end_object(&mut self);
    /// Multiply the current transform by `matrix` until the matching
    /// `end_object`.
    fn transform(&mut self, matrix: &Mat4);

    fn insert_box(&mut self, size: Vec3f) -> ObjectHandle;
    fn insert_cone(&mut self, height: f32, radius: f32, bottom: bool, side: bool) -> ObjectHandle;
    fn insert_cylinder(&mut self, height: f32, radius: f32, bottom: bool, side: bool, top: bool) -> ObjectHandle;
    fn insert_sphere(&mut self, radius: f32) -> ObjectHandle;
    fn insert_shell(&mut self, shell: &Shell) -> ObjectHandle;
    /// Draw a previously inserted object again.
    fn insert_reference(&mut self, object: ObjectHandle);
    fn remove_object(&mut self, object: ObjectHandle);

    fn insert_dir_light(&mut self, ambient_intensity: f32, intensity: f32, color: Color, direction: Vec3f) -> ObjectHandle;
    fn insert_point_light(
        &mut self,
        ambient_intensity: f32,
        attenuation: Vec3f,
        color: Color,
        intensity: f32,
        location: Vec3f,
        radius: f32,
    ) -> ObjectHandle;
    fn insert_spot_light(&mut self, light: &SpotLightProperties) -> ObjectHandle;

    /// Place the camera for the frame that follows.
    fn set_viewpoint(&mut self, position: Vec3f, orientation: Rotation, field_of_view: f32);

    fn enable_lighting(&mut self, enabled: bool);
    fn set_material(&mut self, material: &MaterialProperties);
    /// Geometry inserted until the next call reports picks against `node`.
    fn set_sensitive(&mut self, node: Option<NodeId>);
}

/// State accumulated while descending the scene graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderingContext {
    pub model: Mat4,
}

impl RenderingContext {
    pub fn transformed(&self, local: &Mat4) -> Self {
        Self {
            model: self.model * *local,
        }
    }
}

impl Default for RenderingContext {
    fn default() -> Self {
        Self { model: Mat4::IDENTITY }
    }
}

/// One call received by a [`RecordingViewer`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum ViewerCall {
    BeginObject { name: Option<String>, object: ObjectHandle },
    EndObject,
    Transform { matrix: [f32; 16] },
    InsertBox { object: ObjectHandle, size: Vec3f },
    InsertCone { object: ObjectHandle, height: f32, radius: f32, bottom: bool, side: bool },
    InsertCylinder { object: ObjectHandle, height: f32, radius: f32, bottom: bool, side: bool, top: bool },
    InsertSphere { object: ObjectHandle, radius: f32 },
    InsertShell { object: ObjectHandle, shell: Shell },
    InsertReference { object: ObjectHandle },
    RemoveObject { object: ObjectHandle },
    InsertDirLight { object: ObjectHandle, ambient_intensity: f32, intensity: f32, color: Color, direction: Vec3f },
    InsertPointLight {
        object: ObjectHandle,
        ambient_intensity: f32,
        attenuation: Vec3f,
        color: Color,
        intensity: f32,
        location: Vec3f,
        radius: f32,
    },
    InsertSpotLight { object: ObjectHandle, light: SpotLightProperties },
    SetViewpoint { position: Vec3f, orientation: Rotation, field_of_view: f32 },
    EnableLighting { enabled: bool },
    SetMaterial { material: MaterialProperties },
    SetSensitive { node: Option<String> },
}

impl ViewerCall {
    /// Whether the call created new viewer geometry.
    pub fn is_geometry_insert(&self) -> bool {
        matches!(
            self,
            Self::InsertBox { .. }
                | Self::InsertCone { .. }
                | Self::InsertCylinder { .. }
                | Self::InsertSphere { .. }
                | Self::InsertShell { .. }
        )
    }
}

/// Viewer that records every call, for tests and headless runs.
#[derive(Debug, Default)]
pub struct RecordingViewer {
    calls: Vec<ViewerCall>,
    next_object: u64,
}

impl RecordingViewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[ViewerCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<ViewerCall> {
        std::mem::take(&mut self.calls)
    }

    fn next_object(&mut self) -> ObjectHandle {
        self.next_object += 1;
        ObjectHandle(self.next_object)
    }

    fn record_insert(&mut self, call: impl FnOnce(ObjectHandle) -> ViewerCall) -> ObjectHandle {
        let object = self.next_object();
        self.calls.push(call(object));
        object
    }
}

impl Viewer for RecordingViewer {
    fn begin_object(&mut self, name: Option<&str>) -> ObjectHandle {
        self.record_insert(|object| ViewerCall::BeginObject {
            name: name.map(str::to_string),
            object,
        })
    }

    fn end_object(&mut self) {
        self.calls.push(ViewerCall::EndObject);
    }

    fn transform(&mut self, matrix: &Mat4) {
        self.calls.push(ViewerCall::Transform {
            matrix: matrix.to_cols_array(),
        });
    }

    fn insert_box(&mut self, size: Vec3f) -> ObjectHandle {
        self.record_insert(|object| ViewerCall::InsertBox { object, size })
    }

    fn insert_cone(&mut self, height: f32, radius: f32, bottom: bool, side: bool) -> ObjectHandle {
        self.record_insert(|object| ViewerCall::InsertCone {
            object,
            height,
            radius,
            bottom,
            side,
        })
    }

    fn insert_cylinder(&mut self, height: f32, radius: f32, bottom: bool, side: bool, top: bool) -> ObjectHandle {
        self.record_insert(|object| ViewerCall::InsertCylinder {
            object,
            height,
            radius,
            bottom,
            side,
            top,
        })
    }

    fn insert_sphere(&mut self, radius: f32) -> ObjectHandle {
        self.record_insert(|object| ViewerCall::InsertSphere { object, radius })
    }

    fn insert_shell(&mut self, shell: &Shell) -> ObjectHandle {
        self.record_insert(|object| ViewerCall::InsertShell {
            object,
            shell: shell.clone(),
        })
    }

    fn insert_reference(&mut self, object: ObjectHandle) {
        self.calls.push(ViewerCall::InsertReference { object });
    }

    fn remove_object(&mut self, object: ObjectHandle) {
        self.calls.push(ViewerCall::RemoveObject { object });
    }

    fn insert_dir_light(&mut self, ambient_intensity: f32, intensity: f32, color: Color, direction: Vec3f) -> ObjectHandle {
        self.record_insert(|object| ViewerCall::InsertDirLight {
            object,
            ambient_intensity,
            intensity,
            color,
            direction,
        })
    }

    fn insert_point_light(
        &mut self,
        ambient_intensity: f32,
        attenuation: Vec3f,
        color: Color,
        intensity: f32,
        location: Vec3f,
        radius: f32,
    ) -> ObjectHandle {
        self.record_insert(|object| ViewerCall::InsertPointLight {
            object,
            ambient_intensity,
            attenuation,
            color,
            intensity,
            location,
            radius,
        })
    }

    fn insert_spot_light(&mut self, light: &SpotLightProperties) -> ObjectHandle {
        self.record_insert(|object| ViewerCall::InsertSpotLight {
            object,
            light: light.clone(),
        })
    }

    fn set_viewpoint(&mut self, position: Vec3f, orientation: Rotation, field_of_view: f32) {
        self.calls.push(ViewerCall::SetViewpoint {
            position,
            orientation,
            field_of_view,
        });
    }

    fn enable_lighting(&mut self, enabled: bool) {
        self.calls.push(ViewerCall::EnableLighting { enabled });
    }

    fn set_material(&mut self, material: &MaterialProperties) {
        self.calls.push(ViewerCall::SetMaterial {
            material: material.clone(),
        });
    }

    fn set_sensitive(&mut self, node: Option<NodeId>) {
        self.calls.push(ViewerCall::SetSensitive {
            node: node.map(|node| node.to_string()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_handles_are_unique() {
        let mut viewer = RecordingViewer::new();
        let group = viewer.begin_object(Some("Root"));
        let ball = viewer.insert_sphere(1.0);
        viewer.insert_reference(ball);
        viewer.end_object();
        assert_ne!(group, ball);
        assert_eq!(viewer.calls().len(), 4);
        assert_eq!(viewer.calls().iter().filter(|call| call.is_geometry_insert()).count(), 1);
    }

    #[test]
    fn calls_serialize_with_a_tag() {
        let mut viewer = RecordingViewer::new();
        viewer.enable_lighting(false);
        let json = serde_json::to_string(viewer.calls()).unwrap();
        assert_eq!(json, r#"[{"call":"enable_lighting","enabled":false}]"#);
    }
}
