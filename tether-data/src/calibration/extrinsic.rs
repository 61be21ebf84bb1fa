//! Fixed rigid transform relating the tracking and depth sensor frames.

use glam::{Mat4, Vec3};

/// Linear index of (`row`, `col`) in column-major 4×4 storage.
///
/// Calibration files list values row by row while the matrix is stored
/// column by column; every conversion between the two goes through here.
pub const fn column_major_index(row: usize, col: usize) -> usize {
    row + 4 * col
}

/// Reorder 16 values read row by row into column-major storage.
pub fn row_major_to_column_major(row_major: &[f32; 16]) -> [f32; 16] {
    let mut column_major = [0.0; 16];
    for row in 0..4 {
        for col in 0..4 {
            column_major[column_major_index(row, col)] = row_major[4 * row + col];
        }
    }
    column_major
}

/// Homogeneous transform of the depth sensor expressed in the tracking
/// sensor's frame ("depth w.r.t. tracking").
///
/// Maps depth-frame coordinates into the pose-sensor frame. Loaded once at
/// startup and read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtrinsicTransform {
    matrix: Mat4,
}

impl ExtrinsicTransform {
    /// Column-major default: Y and Z negated (180° about X), no translation.
    pub const DEFAULT_COLUMN_MAJOR: [f32; 16] = [
        1.0, 0.0, 0.0, 0.0, //
        0.0, -1.0, 0.0, 0.0, //
        0.0, 0.0, -1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ];

    pub fn from_matrix(matrix: Mat4) -> Self {
        Self { matrix }
    }

    pub fn from_column_major(values: &[f32; 16]) -> Self {
        Self::from_matrix(Mat4::from_cols_array(values))
    }

    pub fn from_row_major(values: &[f32; 16]) -> Self {
        Self::from_column_major(&row_major_to_column_major(values))
    }

    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    /// Column-major storage, as handed to renderers.
    pub fn to_cols_array(&self) -> [f32; 16] {
        self.matrix.to_cols_array()
    }

    /// Offset of the depth sensor origin in the tracking frame.
    pub fn translation(&self) -> Vec3 {
        self.matrix.w_axis.truncate()
    }

    /// Tracking frame expressed in the depth frame.
    pub fn inverse(&self) -> Self {
        Self::from_matrix(self.matrix.inverse())
    }
}

impl Default for ExtrinsicTransform {
    fn default() -> Self {
        Self::from_column_major(&Self::DEFAULT_COLUMN_MAJOR)
    }
}
