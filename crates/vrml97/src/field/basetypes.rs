use std::fmt;

use serde::{Deserialize, Serialize};

/// Tolerance used when deciding whether a vector is already unit length.
const UNIT_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2f {
    pub x: f32,
    pub y: f32,
}

impl Vec2f {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3f {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn lerp(self, other: Self, t: f32) -> Self {
        Self::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
            self.z + (other.z - self.z) * t,
        )
    }

    pub fn to_glam(self) -> glam::Vec3 {
        glam::Vec3::new(self.x, self.y, self.z)
    }

    pub fn from_glam(v: glam::Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// RGB color with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Hue in degrees `[0, 360)`, saturation and value in `[0, 1]`.
    pub fn to_hsv(self) -> [f32; 3] {
        let max = self.r.max(self.g).max(self.b);
        let min = self.r.min(self.g).min(self.b);
        let delta = max - min;
        let s = if max > 0.0 { delta / max } else { 0.0 };
        if delta == 0.0 {
            return [0.0, s, max];
        }
        let mut h = if self.r == max {
            (self.g - self.b) / delta
        } else if self.g == max {
            2.0 + (self.b - self.r) / delta
        } else {
            4.0 + (self.r - self.g) / delta
        } * 60.0;
        if h < 0.0 {
            h += 360.0;
        }
        [h, s, max]
    }

    pub fn from_hsv([h, s, v]: [f32; 3]) -> Self {
        if s == 0.0 {
            return Self::new(v, v, v);
        }
        let h = if h >= 360.0 { 0.0 } else { h / 60.0 };
        let sector = h.floor();
        let f = h - sector;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));
        match sector as i32 {
            0 => Self::new(v, t, p),
            1 => Self::new(q, v, p),
            2 => Self::new(p, v, t),
            3 => Self::new(p, q, v),
            4 => Self::new(t, p, v),
            _ => Self::new(v, p, q),
        }
    }
}

/// Axis-angle rotation. The axis is kept normalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    axis: Vec3f,
    angle: f32,
}

impl Default for Rotation {
    fn default() -> Self {
        Self {
            axis: Vec3f::new(0.0, 0.0, 1.0),
            angle: 0.0,
        }
    }
}

impl Rotation {
    /// A zero-length axis yields the default `0 0 1 0` rotation.
    pub fn new(x: f32, y: f32, z: f32, angle: f32) -> Self {
        let axis = Vec3f::new(x, y, z);
        let length = axis.length();
        if length == 0.0 || !length.is_finite() {
            return Self::default();
        }
        let axis = if (length - 1.0).abs() <= UNIT_EPSILON {
            axis
        } else {
            Vec3f::new(x / length, y / length, z / length)
        };
        Self { axis, angle }
    }

    pub fn axis(&self) -> Vec3f {
        self.axis
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn to_quat(self) -> glam::Quat {
        glam::Quat::from_axis_angle(self.axis.to_glam().normalize_or_zero(), self.angle)
    }

    pub fn from_quat(quat: glam::Quat) -> Self {
        let (axis, angle) = quat.normalize().to_axis_angle();
        Self::new(axis.x, axis.y, axis.z, angle)
    }

    pub fn slerp(self, other: Self, t: f32) -> Self {
        Self::from_quat(self.to_quat().slerp(other.to_quat(), t))
    }
}

/// Uncompressed SFImage pixels: `width * height` pixels of `components` bytes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Image {
    width: u32,
    height: u32,
    components: u8,
    pixels: Vec<u8>,
}

impl Image {
    /// Returns `None` if the buffer size does not match the dimensions or
    /// `components` is greater than 4.
    pub fn new(width: u32, height: u32, components: u8, pixels: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(components as usize)?;
        (components <= 4 && pixels.len() == expected).then_some(Self {
            width,
            height,
            components,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn components(&self) -> u8 {
        self.components
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Pixel `index` packed big-endian, the way SFImage text stores it.
    pub fn packed_pixel(&self, index: usize) -> u32 {
        let n = self.components as usize;
        self.pixels[index * n..index * n + n]
            .iter()
            .fold(0, |acc, &byte| (acc << 8) | byte as u32)
    }
}

impl fmt::Display for Vec2f {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.x, self.y)
    }
}

impl fmt::Display for Vec3f {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.x, self.y, self.z)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.axis, self.angle)
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.width, self.height, self.components)?;
        let digits = self.components as usize * 2;
        for index in 0..(self.width as usize * self.height as usize) {
            write!(f, " 0x{:0digits$X}", self.packed_pixel(index))?;
        }
        Ok(())
    }
}
