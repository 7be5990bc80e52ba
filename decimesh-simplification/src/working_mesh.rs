//! Mutable topology store for a decimation pass
//!
//! Vertices and triangles live in fixed-capacity arenas; removal is a
//! tombstone flag until final compaction, so indices stay stable while a
//! round mutates the mesh in place. The vertex-to-triangle reference table
//! is rebuilt wholesale each round rather than maintained incrementally,
//! trading an O(triangles) rebuild for much simpler invariants.

use decimesh_core::{Error, Point3f, Result, TriangleMesh};
use nalgebra::Vector3;

use crate::quadric::Quadric;

/// A vertex of the working mesh.
#[derive(Debug, Clone)]
pub(crate) struct Vertex {
    /// Current position; moved in place when this vertex survives a collapse.
    pub p: Vector3<f64>,
    /// Accumulated plane quadric; grows by addition as collapses merge it.
    pub q: Quadric,
    /// True if any incident edge is used by exactly one live triangle.
    pub border: bool,
    /// Start of this vertex's range in the shared reference table.
    pub tstart: usize,
    /// Number of reference-table entries in this vertex's range.
    pub tcount: usize,
}

/// A triangle of the working mesh.
#[derive(Debug, Clone)]
pub(crate) struct Triangle {
    /// Vertex indices; order defines the orientation.
    pub v: [usize; 3],
    /// Cached collapse error per edge slot, with the minimum in `err[3]`.
    pub err: [f64; 4],
    /// Cached unit normal; stale while `dirty` is set.
    pub n: Vector3<f64>,
    pub deleted: bool,
    pub dirty: bool,
}

/// Reference-table entry: triangle `tri` names the owning vertex in corner
/// `slot`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ref {
    pub tri: usize,
    pub slot: usize,
}

/// The arenas a decimation pass mutates, built once from the input mesh and
/// compacted once at the end.
pub(crate) struct WorkingMesh {
    pub vertices: Vec<Vertex>,
    pub triangles: Vec<Triangle>,
    pub refs: Vec<Ref>,
}

impl WorkingMesh {
    /// Build the working arenas from an input mesh.
    ///
    /// Faces with out-of-range indices are an error; faces that are already
    /// degenerate (duplicate indices) are tombstoned up front so every live
    /// triangle has three distinct vertices from the start.
    pub fn from_mesh(mesh: &TriangleMesh) -> Result<Self> {
        let vertices: Vec<Vertex> = mesh
            .vertices
            .iter()
            .map(|p| Vertex {
                p: Vector3::new(p.x as f64, p.y as f64, p.z as f64),
                q: Quadric::zero(),
                border: false,
                tstart: 0,
                tcount: 0,
            })
            .collect();

        let mut triangles = Vec::with_capacity(mesh.faces.len());
        for (fi, face) in mesh.faces.iter().enumerate() {
            for &vi in face {
                if vi >= vertices.len() {
                    return Err(Error::InvalidMesh(format!(
                        "face {} references vertex {} but the mesh has {} vertices",
                        fi,
                        vi,
                        vertices.len()
                    )));
                }
            }
            let degenerate = face[0] == face[1] || face[1] == face[2] || face[2] == face[0];
            triangles.push(Triangle {
                v: *face,
                err: [0.0; 4],
                n: Vector3::zeros(),
                deleted: degenerate,
                dirty: false,
            });
        }

        Ok(Self {
            vertices,
            triangles,
            refs: Vec::new(),
        })
    }

    /// Number of non-tombstoned triangles.
    pub fn live_triangles(&self) -> usize {
        self.triangles.iter().filter(|t| !t.deleted).count()
    }

    /// Unit normal from the triangle's current corner positions, or `None`
    /// when the corners are (near) collinear.
    pub fn face_normal(&self, t: &Triangle) -> Option<Vector3<f64>> {
        let p0 = self.vertices[t.v[0]].p;
        let e1 = self.vertices[t.v[1]].p - p0;
        let e2 = self.vertices[t.v[2]].p - p0;
        e1.cross(&e2).try_normalize(f64::EPSILON)
    }

    /// Accumulate each live triangle's plane quadric into its three corners
    /// and cache the triangle normal. Zero-area triangles are tombstoned.
    pub fn initialize_quadrics(&mut self) {
        for i in 0..self.triangles.len() {
            if self.triangles[i].deleted {
                continue;
            }
            match self.face_normal(&self.triangles[i]) {
                Some(n) => {
                    let p0 = self.vertices[self.triangles[i].v[0]].p;
                    let q = Quadric::from_plane(n.x, n.y, n.z, -n.dot(&p0));
                    self.triangles[i].n = n;
                    for j in 0..3 {
                        let vi = self.triangles[i].v[j];
                        self.vertices[vi].q += q;
                    }
                }
                None => self.triangles[i].deleted = true,
            }
        }
    }

    /// Rebuild the vertex-to-triangle reference table from scratch with a
    /// counting-sort fill over the live triangles.
    ///
    /// After this returns, `refs[v.tstart..v.tstart + v.tcount]` enumerates
    /// exactly the live triangles naming vertex `v`.
    pub fn rebuild_refs(&mut self) {
        for v in &mut self.vertices {
            v.tstart = 0;
            v.tcount = 0;
        }
        for t in &self.triangles {
            if t.deleted {
                continue;
            }
            for &vi in &t.v {
                self.vertices[vi].tcount += 1;
            }
        }

        let mut tstart = 0;
        for v in &mut self.vertices {
            v.tstart = tstart;
            tstart += v.tcount;
            v.tcount = 0;
        }

        self.refs.clear();
        self.refs.resize(tstart, Ref { tri: 0, slot: 0 });
        for (ti, t) in self.triangles.iter().enumerate() {
            if t.deleted {
                continue;
            }
            for (slot, &vi) in t.v.iter().enumerate() {
                let v = &mut self.vertices[vi];
                self.refs[v.tstart + v.tcount] = Ref { tri: ti, slot };
                v.tcount += 1;
            }
        }
    }

    /// Classify border vertices: a vertex lies on the boundary when one of
    /// its incident edges is used by exactly one live triangle.
    ///
    /// Scans each vertex's incident triangles and counts how often every
    /// vertex id appears among them; an id seen exactly once belongs to an
    /// open edge. Requires the reference table to be current.
    pub fn classify_borders(&mut self) {
        for v in &mut self.vertices {
            v.border = false;
        }

        let mut vids: Vec<usize> = Vec::new();
        let mut vcount: Vec<usize> = Vec::new();
        for vi in 0..self.vertices.len() {
            vids.clear();
            vcount.clear();
            let tstart = self.vertices[vi].tstart;
            let tcount = self.vertices[vi].tcount;
            for k in 0..tcount {
                let t = &self.triangles[self.refs[tstart + k].tri];
                for &id in &t.v {
                    match vids.iter().position(|&x| x == id) {
                        Some(ofs) => vcount[ofs] += 1,
                        None => {
                            vids.push(id);
                            vcount.push(1);
                        }
                    }
                }
            }
            for (ofs, &count) in vcount.iter().enumerate() {
                if count == 1 {
                    self.vertices[vids[ofs]].border = true;
                }
            }
        }
    }

    /// Drop tombstoned triangles and renumber the vertices still referenced
    /// by a kept triangle into a dense output mesh.
    ///
    /// Returns the compacted mesh and the old-to-new vertex renumbering;
    /// vertices with no surviving incident triangle map to `None`. Optional
    /// per-vertex attributes of `source` are carried through by surviving
    /// row.
    pub fn compact(mut self, source: &TriangleMesh) -> (TriangleMesh, Vec<Option<usize>>) {
        for v in &mut self.vertices {
            v.tcount = 0;
        }
        let mut kept: Vec<[usize; 3]> = Vec::new();
        for t in &self.triangles {
            if t.deleted {
                continue;
            }
            kept.push(t.v);
            for &vi in &t.v {
                self.vertices[vi].tcount = 1;
            }
        }

        let mut remap: Vec<Option<usize>> = vec![None; self.vertices.len()];
        let mut positions: Vec<Point3f> = Vec::new();
        for (vi, v) in self.vertices.iter().enumerate() {
            if v.tcount == 0 {
                continue;
            }
            remap[vi] = Some(positions.len());
            positions.push(Point3f::new(v.p.x as f32, v.p.y as f32, v.p.z as f32));
        }

        let mut faces = Vec::with_capacity(kept.len());
        for f in &kept {
            if let (Some(a), Some(b), Some(c)) = (remap[f[0]], remap[f[1]], remap[f[2]]) {
                faces.push([a, b, c]);
            }
        }

        let mut mesh = TriangleMesh::from_vertices_and_faces(positions, faces);
        if let Some(normals) = &source.normals {
            let surviving = (0..remap.len())
                .filter(|&vi| remap[vi].is_some())
                .map(|vi| normals[vi])
                .collect();
            mesh.set_normals(surviving);
        }
        if let Some(colors) = &source.colors {
            let surviving = (0..remap.len())
                .filter(|&vi| remap[vi].is_some())
                .map(|vi| colors[vi])
                .collect();
            mesh.set_colors(surviving);
        }

        (mesh, remap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn make_single_triangle() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.5, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        )
    }

    fn make_tetrahedron() -> TriangleMesh {
        // Consistently wound: each shared edge appears in opposite directions
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.5, 1.0, 0.0),
                Point3::new(0.5, 0.5, 1.0),
            ],
            vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
        )
    }

    fn make_plane_grid(size: usize) -> TriangleMesh {
        let mut vertices = Vec::new();
        for y in 0..size {
            for x in 0..size {
                vertices.push(Point3::new(x as f32, y as f32, 0.0));
            }
        }
        let mut faces = Vec::new();
        for y in 0..(size - 1) {
            for x in 0..(size - 1) {
                let tl = y * size + x;
                let tr = tl + 1;
                let bl = (y + 1) * size + x;
                let br = bl + 1;
                faces.push([tl, bl, tr]);
                faces.push([tr, bl, br]);
            }
        }
        TriangleMesh::from_vertices_and_faces(vertices, faces)
    }

    #[test]
    fn test_reference_table_matches_incidence() {
        let mesh = make_tetrahedron();
        let mut wm = WorkingMesh::from_mesh(&mesh).unwrap();
        wm.rebuild_refs();

        assert_eq!(wm.refs.len(), 12); // 4 triangles * 3 corners
        for (vi, v) in wm.vertices.iter().enumerate() {
            assert_eq!(v.tcount, 3, "tetrahedron vertex touches 3 triangles");
            for k in 0..v.tcount {
                let r = wm.refs[v.tstart + k];
                assert_eq!(wm.triangles[r.tri].v[r.slot], vi);
            }
        }
    }

    #[test]
    fn test_border_classification() {
        let mesh = make_single_triangle();
        let mut wm = WorkingMesh::from_mesh(&mesh).unwrap();
        wm.rebuild_refs();
        wm.classify_borders();
        assert!(wm.vertices.iter().all(|v| v.border));

        let mesh = make_tetrahedron();
        let mut wm = WorkingMesh::from_mesh(&mesh).unwrap();
        wm.rebuild_refs();
        wm.classify_borders();
        assert!(wm.vertices.iter().all(|v| !v.border), "closed mesh has no border");

        let mesh = make_plane_grid(3);
        let mut wm = WorkingMesh::from_mesh(&mesh).unwrap();
        wm.rebuild_refs();
        wm.classify_borders();
        // 3x3 grid: only the middle vertex (index 4) is interior
        for (vi, v) in wm.vertices.iter().enumerate() {
            assert_eq!(v.border, vi != 4, "vertex {}", vi);
        }
    }

    #[test]
    fn test_quadrics_accumulate_planes() {
        let mesh = make_single_triangle();
        let mut wm = WorkingMesh::from_mesh(&mesh).unwrap();
        wm.initialize_quadrics();

        // All corners share the single z = 0 plane quadric
        for v in &wm.vertices {
            assert_eq!(v.q.evaluate(&Vector3::new(0.3, 0.3, 0.0)), 0.0);
            assert!((v.q.evaluate(&Vector3::new(0.3, 0.3, 1.0)) - 1.0).abs() < 1e-12);
        }
        assert!((wm.triangles[0].n.z.abs() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_input_faces_tombstoned() {
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.5, 1.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 1, 1], [0, 1, 3]],
        );
        let mut wm = WorkingMesh::from_mesh(&mesh).unwrap();
        assert!(wm.triangles[1].deleted, "duplicate-index face");
        wm.initialize_quadrics();
        assert!(wm.triangles[2].deleted, "zero-area collinear face");
        assert_eq!(wm.live_triangles(), 1);
    }

    #[test]
    fn test_out_of_range_face_is_an_error() {
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)],
            vec![[0, 1, 7]],
        );
        assert!(WorkingMesh::from_mesh(&mesh).is_err());
    }

    #[test]
    fn test_compact_renumbers_densely() {
        let mesh = make_tetrahedron();
        let mut wm = WorkingMesh::from_mesh(&mesh).unwrap();
        // Tombstone the three faces around the apex, leaving the base
        wm.triangles[1].deleted = true;
        wm.triangles[2].deleted = true;
        wm.triangles[3].deleted = true;

        let (out, remap) = wm.compact(&mesh);
        assert_eq!(out.face_count(), 1);
        assert_eq!(out.vertex_count(), 3);
        assert_eq!(remap.len(), 4);
        assert_eq!(remap[3], None, "vertex 3 lost all incident triangles");

        for face in &out.faces {
            for &vi in face {
                assert!(vi < out.vertex_count());
            }
            assert!(face[0] != face[1] && face[1] != face[2] && face[2] != face[0]);
        }
        // Surviving vertices keep their positions under the remap
        for (old, new) in remap.iter().enumerate() {
            if let Some(new) = new {
                assert_eq!(out.vertices[*new], mesh.vertices[old]);
            }
        }
    }

    #[test]
    fn test_compact_carries_attributes() {
        let mut mesh = make_tetrahedron();
        mesh.set_colors(vec![[0, 0, 0], [10, 10, 10], [20, 20, 20], [30, 30, 30]]);
        let mut wm = WorkingMesh::from_mesh(&mesh).unwrap();
        wm.triangles[1].deleted = true;
        wm.triangles[2].deleted = true;
        wm.triangles[3].deleted = true;

        let (out, _) = wm.compact(&mesh);
        let colors = out.colors.expect("colors carried through");
        assert_eq!(colors, vec![[0, 0, 0], [10, 10, 10], [20, 20, 20]]);
    }
}
