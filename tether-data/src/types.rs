//! Core sensor data types for pose samples, point clouds, and textures.
//!
//! These are CPU-side representations produced by device pipelines and
//! consumed by the fusion core. Vertex types derive bytemuck so renderers
//! can upload a cloud without repacking it.

use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec2, Vec3};
use image::{GrayImage, RgbImage};
use thiserror::Error;

/// Errors raised when constructing sensor data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Point cloud has {vertices} vertices but {texture_coordinates} texture coordinates")]
    MismatchedTextureCoordinates {
        vertices: usize,
        texture_coordinates: usize,
    },
}

/// A point in the depth sensor's local frame (meters).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vertex {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

impl From<Vec3> for Vertex {
    fn from(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// Normalized texture coordinate into the bound color or infrared image.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct TextureCoordinate {
    pub u: f32,
    pub v: f32,
}

impl TextureCoordinate {
    pub fn new(u: f32, v: f32) -> Self {
        Self { u, v }
    }

    pub fn as_vec2(&self) -> Vec2 {
        Vec2::new(self.u, self.v)
    }
}

/// Tracker confidence reported alongside a pose sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Confidence {
    #[default]
    Failed = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

impl From<u32> for Confidence {
    fn from(value: u32) -> Self {
        match value & 0x3 {
            1 => Confidence::Low,
            2 => Confidence::Medium,
            3 => Confidence::High,
            _ => Confidence::Failed,
        }
    }
}

/// A timestamped 6-DoF state estimate from a motion-tracking stream.
///
/// `timestamp_ms` is monotonic per device but is not synchronized across
/// devices. `rotation` must stay (approximately) unit-norm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Position in meters.
    pub translation: Vec3,
    /// Orientation quaternion (x, y, z, w).
    pub rotation: Quat,
    /// Linear velocity in m/s.
    pub velocity: Vec3,
    /// Linear acceleration in m/s².
    pub acceleration: Vec3,
    /// Angular velocity in rad/s.
    pub angular_velocity: Vec3,
    /// Angular acceleration in rad/s².
    pub angular_acceleration: Vec3,
    /// Capture time in milliseconds.
    pub timestamp_ms: f64,
    pub tracker_confidence: Confidence,
}

impl Pose {
    /// Create a stationary pose sample.
    pub fn new(translation: Vec3, rotation: Quat, timestamp_ms: f64) -> Self {
        Self {
            translation,
            rotation,
            velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            angular_acceleration: Vec3::ZERO,
            timestamp_ms,
            tracker_confidence: Confidence::High,
        }
    }

    /// Set linear velocity.
    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    /// Set linear acceleration.
    pub fn with_acceleration(mut self, acceleration: Vec3) -> Self {
        self.acceleration = acceleration;
        self
    }

    /// Set angular velocity.
    pub fn with_angular_velocity(mut self, angular_velocity: Vec3) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    /// Set angular acceleration.
    pub fn with_angular_acceleration(mut self, angular_acceleration: Vec3) -> Self {
        self.angular_acceleration = angular_acceleration;
        self
    }

    /// Set tracker confidence.
    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.tracker_confidence = confidence;
        self
    }

    /// Whether the orientation is unit-norm within glam's tolerance.
    pub fn is_normalized(&self) -> bool {
        self.rotation.is_normalized()
    }

    /// Whether the translation holds only finite values.
    pub fn has_finite_translation(&self) -> bool {
        self.translation.is_finite()
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Quat::IDENTITY, 0.0).with_confidence(Confidence::Failed)
    }
}

/// A depth-derived point cloud with per-vertex texture coordinates.
///
/// Immutable once built: a newer cloud replaces an older one, it is never
/// edited in place.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    vertices: Vec<Vertex>,
    texture_coordinates: Vec<TextureCoordinate>,
    timestamp_ms: f64,
    frame_number: u64,
}

impl PointCloud {
    /// Build a cloud. Vertices and texture coordinates must pair 1:1.
    pub fn new(
        vertices: Vec<Vertex>,
        texture_coordinates: Vec<TextureCoordinate>,
        timestamp_ms: f64,
        frame_number: u64,
    ) -> Result<Self, DataError> {
        if vertices.len() != texture_coordinates.len() {
            return Err(DataError::MismatchedTextureCoordinates {
                vertices: vertices.len(),
                texture_coordinates: texture_coordinates.len(),
            });
        }
        Ok(Self {
            vertices,
            texture_coordinates,
            timestamp_ms,
            frame_number,
        })
    }

    /// A depth frame that produced no points.
    pub fn empty(timestamp_ms: f64, frame_number: u64) -> Self {
        Self {
            vertices: Vec::new(),
            texture_coordinates: Vec::new(),
            timestamp_ms,
            frame_number,
        }
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn texture_coordinates(&self) -> &[TextureCoordinate] {
        &self.texture_coordinates
    }

    /// Depth frame capture time in milliseconds.
    pub fn timestamp_ms(&self) -> f64 {
        self.timestamp_ms
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Iterate vertex positions as glam vectors.
    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices.iter().map(Vertex::position)
    }

    /// Raw vertex bytes, suitable for a vertex buffer upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}

/// The image a point cloud is textured with.
#[derive(Debug, Clone, PartialEq)]
pub enum TextureImage {
    Color(RgbImage),
    Infrared(GrayImage),
}

impl TextureImage {
    /// Image dimensions (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            TextureImage::Color(image) => image.dimensions(),
            TextureImage::Infrared(image) => image.dimensions(),
        }
    }

    pub fn is_color(&self) -> bool {
        matches!(self, TextureImage::Color(_))
    }
}
