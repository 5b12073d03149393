// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! contains useful type definitions and conversion functions.
use nalgebra::{DMatrix, Isometry3, Matrix4, Rotation3, SVector, Translation3, UnitQuaternion};

/// A Vector with 7 entries
pub type Vector7 = SVector<f64, 7>;

/// An action sequence with one row per time step and one column per action dimension (L x A).
pub type ActionSequence = DMatrix<f64>;

/// converts a 4x4 column-major homogenous matrix to an Isometry
pub fn array_to_isometry(array: &[f64; 16]) -> Isometry3<f64> {
    let rot = Rotation3::from_matrix(
        &Matrix4::from_column_slice(array)
            .remove_column(3)
            .remove_row(3),
    );
    Isometry3::from_parts(
        Translation3::new(array[12], array[13], array[14]),
        rot.into(),
    )
}

/// converts an Isometry to a 4x4 column-major homogenous matrix
pub fn isometry_to_array(pose: &Isometry3<f64>) -> [f64; 16] {
    let mut out = [0.; 16];
    for (i, &x) in pose.to_homogeneous().iter().enumerate() {
        out[i] = x;
    }
    out
}

/// Creates the end-effector pose used for pushing: the planar position `(x, y)` at the
/// given height with a fixed orientation.
pub fn push_pose(x: f64, y: f64, height: f64, orientation: UnitQuaternion<f64>) -> Isometry3<f64> {
    Isometry3::from_parts(Translation3::new(x, y, height), orientation)
}

/// Orientation of an end effector pointing straight down.
pub fn downward_orientation() -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(std::f64::consts::PI, 0., 0.)
}
