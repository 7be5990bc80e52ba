//! Core data structures for decimesh
//!
//! This crate provides the types shared between the decimation algorithm and
//! its callers: point/vector aliases, the triangle mesh container, and the
//! common error type.

pub mod point;
pub mod mesh;
pub mod error;

pub use point::*;
pub use mesh::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3};

// Type aliases for easier imports
pub type Point = Point3f;
pub type Mesh = TriangleMesh;
