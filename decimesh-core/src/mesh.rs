//! Mesh data structures and functionality

use crate::point::*;
use serde::{Deserialize, Serialize};

/// A triangle mesh with vertices and faces
///
/// Faces index into the vertex array; the winding order of each face defines
/// its orientation. Per-vertex normals and colors are optional attributes
/// carried alongside the positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3f>>,
    pub colors: Option<Vec<[u8; 3]>>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            normals: None,
            colors: None,
        }
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            normals: None,
            colors: None,
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Add a vertex to the mesh
    pub fn add_vertex(&mut self, vertex: Point3f) -> usize {
        let index = self.vertices.len();
        self.vertices.push(vertex);
        index
    }

    /// Add a face to the mesh
    pub fn add_face(&mut self, face: [usize; 3]) {
        self.faces.push(face);
    }

    /// Calculate face normals
    pub fn calculate_face_normals(&self) -> Vec<Vector3f> {
        self.faces
            .iter()
            .map(|face| {
                let v0 = self.vertices[face[0]];
                let v1 = self.vertices[face[1]];
                let v2 = self.vertices[face[2]];

                let edge1 = v1 - v0;
                let edge2 = v2 - v0;

                edge1.cross(&edge2).normalize()
            })
            .collect()
    }

    /// Total surface area, summed over all faces
    pub fn surface_area(&self) -> f64 {
        self.faces
            .iter()
            .map(|face| {
                let v0 = self.vertices[face[0]];
                let v1 = self.vertices[face[1]];
                let v2 = self.vertices[face[2]];

                let edge1 = v1 - v0;
                let edge2 = v2 - v0;

                edge1.cross(&edge2).magnitude() as f64 * 0.5
            })
            .sum()
    }

    /// Set vertex normals
    pub fn set_normals(&mut self, normals: Vec<Vector3f>) {
        if normals.len() == self.vertices.len() {
            self.normals = Some(normals);
        }
    }

    /// Set vertex colors
    pub fn set_colors(&mut self, colors: Vec<[u8; 3]>) {
        if colors.len() == self.vertices.len() {
            self.colors = Some(colors);
        }
    }

    /// Clear the mesh
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.faces.clear();
        self.normals = None;
        self.colors = None;
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_unit_right_triangle() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        )
    }

    #[test]
    fn test_counts_and_empty() {
        let mut mesh = TriangleMesh::new();
        assert!(mesh.is_empty());

        let a = mesh.add_vertex(Point3f::new(0.0, 0.0, 0.0));
        let b = mesh.add_vertex(Point3f::new(1.0, 0.0, 0.0));
        let c = mesh.add_vertex(Point3f::new(0.0, 1.0, 0.0));
        mesh.add_face([a, b, c]);

        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.face_count(), 1);
        assert!(!mesh.is_empty());

        mesh.clear();
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_face_normals() {
        let mesh = make_unit_right_triangle();
        let normals = mesh.calculate_face_normals();
        assert_eq!(normals.len(), 1);
        assert_relative_eq!(normals[0].z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_surface_area() {
        let mesh = make_unit_right_triangle();
        assert_relative_eq!(mesh.surface_area(), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_set_attributes_length_checked() {
        let mut mesh = make_unit_right_triangle();
        mesh.set_normals(vec![Vector3f::new(0.0, 0.0, 1.0); 2]);
        assert!(mesh.normals.is_none());
        mesh.set_normals(vec![Vector3f::new(0.0, 0.0, 1.0); 3]);
        assert!(mesh.normals.is_some());

        mesh.set_colors(vec![[255, 0, 0]; 3]);
        assert_eq!(mesh.colors.as_ref().map(|c| c.len()), Some(3));
    }
}
