//! Quadric error metric mesh decimation
//!
//! This crate reduces a triangulated surface to a target triangle count
//! while minimizing geometric distortion. It implements iterative greedy
//! edge collapse driven by quadric error metrics (QEM): each vertex
//! accumulates the error quadrics of its incident triangle planes, and each
//! round collapses the edges whose combined quadric error falls below a
//! threshold that grows geometrically with the round index.
//!
//! The input mesh is expected to be triangulated and free of non-manifold
//! edges beyond simple open boundaries (the usual output of a surface
//! reconstruction stage). The output carries an old-to-new vertex
//! renumbering so downstream consumers keyed by the original vertex indices
//! (e.g. a texturing stage) can follow the reduction.

pub mod decimate;
pub mod quadric;

mod working_mesh;

pub use decimate::*;
pub use quadric::*;

use decimesh_core::{Result, TriangleMesh};

/// Simplify a mesh by reducing the number of faces/vertices
pub trait MeshSimplifier {
    /// Simplify mesh with target reduction ratio (0.0 = no reduction, 1.0 = maximum reduction)
    fn simplify(&self, mesh: &TriangleMesh, reduction_ratio: f32) -> Result<TriangleMesh>;
}
