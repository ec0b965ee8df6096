//! The VRML97 node kinds a browser knows without any PROTO.
//!
//! Each kind is an interface table with VRML97 defaults plus a behavior;
//! kinds that only store values use the default behavior.

use std::rc::Rc;

use crate::field::FieldValue;
use crate::node::{BuiltinMetatype, NodeMetatype};

mod geometry;
mod grouping;
mod inline;
mod interpolators;
mod lights;
mod selection;
mod shape;
mod time_sensor;
mod touch_sensor;
mod viewpoint;

pub use grouping::transform_matrix;
pub use inline::InlineState;
pub use shape::material_properties;
pub use time_sensor::TimeSensorState;
pub use touch_sensor::TouchSensorState;

/// Metatypes of every built-in kind, in registration order.
pub fn builtin_metatypes() -> Vec<Rc<dyn NodeMetatype>> {
    vec![
        grouping::group(),
        grouping::transform(),
        selection::switch(),
        selection::lod(),
        shape::shape(),
        shape::appearance(),
        shape::material(),
        geometry::box_geometry(),
        geometry::sphere(),
        geometry::cone(),
        geometry::cylinder(),
        geometry::coordinate(),
        geometry::indexed_face_set(),
        lights::directional_light(),
        lights::point_light(),
        lights::spot_light(),
        viewpoint::viewpoint(),
        world_info(),
        time_sensor::time_sensor(),
        touch_sensor::touch_sensor(),
        interpolators::scalar_interpolator(),
        interpolators::position_interpolator(),
        interpolators::color_interpolator(),
        interpolators::orientation_interpolator(),
        inline::inline(),
    ]
}

fn world_info() -> Rc<dyn NodeMetatype> {
    BuiltinMetatype::builder("WorldInfo")
        .field("info", FieldValue::MfString(Vec::new()))
        .field("title", FieldValue::SfString(String::new()))
        .build()
}
