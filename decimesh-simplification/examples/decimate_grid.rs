//! Basic decimation example
//!
//! Builds a curved test surface, reduces it to a quarter of its triangle
//! count, and prints the run summary.

use anyhow::Result;
use decimesh_core::{Point3f, TriangleMesh};
use decimesh_simplification::QuadricDecimator;

fn make_curved_surface(size: usize) -> TriangleMesh {
    let mut vertices = Vec::new();
    for y in 0..size {
        for x in 0..size {
            let fx = x as f32 / (size - 1) as f32 * std::f32::consts::PI;
            let fy = y as f32 / (size - 1) as f32 * std::f32::consts::PI;
            vertices.push(Point3f::new(x as f32, y as f32, (fx.sin() * fy.sin()) * 2.0));
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

fn main() -> Result<()> {
    let mesh = make_curved_surface(20);
    println!(
        "Input: {} vertices, {} triangles",
        mesh.vertex_count(),
        mesh.face_count()
    );

    let decimator = QuadricDecimator::new();
    let target = mesh.face_count() / 4;
    let result = decimator.decimate(&mesh, target)?;

    println!("Result: {}", result.summary);
    println!(
        "Output: {} vertices, {} triangles",
        result.mesh.vertex_count(),
        result.mesh.face_count()
    );

    let absorbed = result.vertex_remap.iter().filter(|m| m.is_none()).count();
    println!("Absorbed {} of {} input vertices", absorbed, result.vertex_remap.len());

    Ok(())
}
