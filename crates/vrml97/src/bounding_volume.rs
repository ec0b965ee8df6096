use glam::{Mat4, Vec3};
use serde::Serialize;

use crate::field::Vec3f;

/// Sphere enclosing a subgraph, cached per node and used for culling by
/// viewers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingSphere {
    center: Vec3f,
    /// Negative for the empty sphere.
    radius: f32,
}

impl BoundingSphere {
    pub const EMPTY: Self = Self {
        center: Vec3f::ZERO,
        radius: -1.0,
    };

    pub fn new(center: Vec3f, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn center(&self) -> Vec3f {
        self.center
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn is_empty(&self) -> bool {
        self.radius < 0.0
    }

    /// Smallest sphere enclosing `points`.
    ///
    /// Not minimal: centered on the bounding box.
    pub fn from_points(points: &[Vec3f]) -> Self {
        let Some(first) = points.first() else {
            return Self::EMPTY;
        };
        let (min, max) = points.iter().fold(
            (first.to_glam(), first.to_glam()),
            |(min, max), point| (min.min(point.to_glam()), max.max(point.to_glam())),
        );
        let center = (min + max) * 0.5;
        let radius = points
            .iter()
            .map(|point| point.to_glam().distance(center))
            .fold(0.0, f32::max);
        Self::new(Vec3f::from_glam(center), radius)
    }

    /// Grow to also enclose `other`.
    pub fn extend(&mut self, other: &BoundingSphere) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = *other;
            return;
        }
        let (c1, c2) = (self.center.to_glam(), other.center.to_glam());
        let distance = c1.distance(c2);
        if distance + other.radius <= self.radius {
            return;
        }
        if distance + self.radius <= other.radius {
            *self = *other;
            return;
        }
        let radius = (distance + self.radius + other.radius) * 0.5;
        let center = c1 + (c2 - c1) * ((radius - self.radius) / distance);
        *self = Self::new(Vec3f::from_glam(center), radius);
    }

    /// The sphere after `matrix`, enlarged by the largest axis scale.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        let center = matrix.transform_point3(self.center.to_glam());
        let scale = [Vec3::X, Vec3::Y, Vec3::Z]
            .into_iter()
            .map(|axis| matrix.transform_vector3(axis).length())
            .fold(0.0, f32::max);
        Self::new(Vec3f::from_glam(center), self.radius * scale)
    }
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self::EMPTY
    }
}
