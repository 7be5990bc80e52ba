//! Quadric error metric edge-collapse decimation
//!
//! Implements the iterative greedy simplification loop: every round sweeps
//! the live triangles, collapsing edges whose cached quadric error falls
//! below an acceptance threshold that grows geometrically with the round
//! index. Collapses that would fold a neighbouring triangle are rejected by
//! the flip guard; accepted collapses retarget the absorbed vertex's
//! triangles in place and tombstone the ones that degenerate.

use std::fmt;

use decimesh_core::{Error, Result, TriangleMesh};
use nalgebra::Vector3;
use tracing::{debug, info, warn};

use crate::working_mesh::WorkingMesh;
use crate::MeshSimplifier;

/// Meshes are not reduced below this many triangles; smaller targets are
/// declined with [`DecimationStatus::TargetUnreachable`].
pub const MIN_TARGET_TRIANGLES: usize = 4;

/// Edge directions closer than this |cosine| to parallel would leave the
/// moved triangle with near-zero area.
const DEGENERATE_EDGE_DOT: f64 = 0.999;

/// Minimum dot product between a triangle's cached normal and its would-be
/// normal for a collapse to be accepted.
const FLIP_NORMAL_DOT: f64 = 0.2;

// ============================================================
// Outcome Types
// ============================================================

/// How a decimation run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimationStatus {
    /// The live triangle count reached the requested target.
    Converged,
    /// The round budget ran out before the target was reached; the best
    /// mesh obtained so far is returned.
    Exhausted,
    /// The requested target is below [`MIN_TARGET_TRIANGLES`]; the input
    /// mesh is returned unchanged.
    TargetUnreachable,
    /// The input had no vertices or no triangles; nothing to simplify.
    EmptyInput,
}

/// Counters reported alongside the decimated mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimationSummary {
    pub input_triangles: usize,
    pub output_triangles: usize,
    /// Simplification rounds executed (zero for no-op outcomes).
    pub rounds: usize,
    /// Edge collapses performed across all rounds.
    pub collapses: usize,
    pub status: DecimationStatus,
}

impl fmt::Display for DecimationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            DecimationStatus::Converged => "converged",
            DecimationStatus::Exhausted => "exhausted",
            DecimationStatus::TargetUnreachable => "target unreachable",
            DecimationStatus::EmptyInput => "empty input",
        };
        write!(
            f,
            "{} -> {} triangles in {} rounds ({} collapses, {})",
            self.input_triangles, self.output_triangles, self.rounds, self.collapses, status
        )
    }
}

/// Result of a decimation run.
#[derive(Debug, Clone)]
pub struct Decimation {
    /// The reduced mesh.
    pub mesh: TriangleMesh,
    /// Old vertex index to new vertex index, `None` for vertices fully
    /// absorbed by collapses. Downstream consumers keyed by the original
    /// vertex indices (texture or camera data) follow this renumbering.
    pub vertex_remap: Vec<Option<usize>>,
    pub summary: DecimationSummary,
}

// ============================================================
// Decimator
// ============================================================

/// Quadric error metric edge-collapse decimator.
///
/// Reduces a triangle mesh toward a target triangle count by greedily
/// collapsing edges scored with quadric error metrics. The acceptance
/// threshold grows geometrically across rounds as
/// `threshold_base * (round + 3)^aggressiveness`, so early rounds only take
/// near-lossless collapses and later rounds trade fidelity for convergence.
#[derive(Debug, Clone)]
pub struct QuadricDecimator {
    /// Sharpness of the threshold growth. Higher values accept larger
    /// errors sooner, converging faster at the cost of fidelity; 5..8 are
    /// good numbers.
    pub aggressiveness: f64,
    /// Round budget before the run reports [`DecimationStatus::Exhausted`].
    pub max_rounds: usize,
    /// Keep boundary contours in place: edges with exactly one border
    /// endpoint are never collapsed, and border-border collapses choose
    /// among the edge endpoints and midpoint instead of the unconstrained
    /// minimizer.
    pub preserve_boundary: bool,
    /// Base scale of the acceptance threshold schedule.
    pub threshold_base: f64,
}

impl Default for QuadricDecimator {
    fn default() -> Self {
        Self {
            aggressiveness: 7.0,
            max_rounds: 100,
            preserve_boundary: true,
            threshold_base: 1e-9,
        }
    }
}

impl QuadricDecimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(aggressiveness: f64, max_rounds: usize, preserve_boundary: bool) -> Self {
        Self {
            aggressiveness,
            max_rounds,
            preserve_boundary,
            ..Self::default()
        }
    }

    /// Reduce `mesh` toward `target_count` triangles.
    ///
    /// Returns the compacted mesh, the old-to-new vertex renumbering, and a
    /// summary of the run. Unreachable targets and empty inputs are
    /// reported in the summary status rather than as errors; malformed
    /// input (out-of-range face indices, non-positive aggressiveness) is an
    /// error.
    pub fn decimate(&self, mesh: &TriangleMesh, target_count: usize) -> Result<Decimation> {
        if !(self.aggressiveness > 0.0 && self.aggressiveness.is_finite()) {
            return Err(Error::InvalidData(
                "aggressiveness must be positive and finite".to_string(),
            ));
        }

        let input_triangles = mesh.face_count();
        if mesh.is_empty() {
            return Ok(unchanged(mesh, DecimationStatus::EmptyInput));
        }
        if target_count < MIN_TARGET_TRIANGLES {
            warn!(
                target_count,
                minimum = MIN_TARGET_TRIANGLES,
                "target below minimum viable mesh, returning input unchanged"
            );
            return Ok(unchanged(mesh, DecimationStatus::TargetUnreachable));
        }
        if input_triangles <= target_count {
            return Ok(unchanged(mesh, DecimationStatus::Converged));
        }

        let mut wm = WorkingMesh::from_mesh(mesh)?;
        wm.initialize_quadrics();
        wm.rebuild_refs();
        wm.classify_borders();
        seed_edge_errors(&mut wm, self.preserve_boundary);

        info!(
            input = input_triangles,
            target_count,
            aggressiveness = self.aggressiveness,
            "starting quadric decimation"
        );

        let mut live = wm.live_triangles();
        let mut collapses = 0usize;
        let mut rounds = 0usize;
        while rounds < self.max_rounds && live > target_count {
            // References are already current on entry to the first round
            if rounds > 0 {
                wm.rebuild_refs();
            }
            refresh_dirty(&mut wm, self.preserve_boundary);

            let threshold = self.threshold_base * (rounds as f64 + 3.0).powf(self.aggressiveness);
            let before = live;
            self.sweep(&mut wm, threshold, target_count, &mut live, &mut collapses);
            debug!(
                round = rounds,
                threshold,
                live,
                removed = before - live,
                "decimation round complete"
            );
            rounds += 1;
        }

        let status = if live <= target_count {
            DecimationStatus::Converged
        } else {
            DecimationStatus::Exhausted
        };

        let (out, vertex_remap) = wm.compact(mesh);
        let summary = DecimationSummary {
            input_triangles,
            output_triangles: out.face_count(),
            rounds,
            collapses,
            status,
        };
        info!(%summary, "quadric decimation finished");

        Ok(Decimation {
            mesh: out,
            vertex_remap,
            summary,
        })
    }

    /// One sweep over the live triangles with a fixed threshold: the body
    /// of a single simplification round.
    ///
    /// Each triangle offers its three edges; an edge collapses if its
    /// cached error is below the threshold, the boundary policy allows it,
    /// and the flip guard accepts the move for both endpoints. Triangles
    /// touched by a collapse are marked dirty and skipped for the rest of
    /// the round.
    fn sweep(
        &self,
        wm: &mut WorkingMesh,
        threshold: f64,
        target: usize,
        live: &mut usize,
        collapses: &mut usize,
    ) {
        let mut deleted0: Vec<bool> = Vec::new();
        let mut deleted1: Vec<bool> = Vec::new();

        for ti in 0..wm.triangles.len() {
            if *live <= target {
                break;
            }
            {
                let t = &wm.triangles[ti];
                if t.deleted || t.dirty || t.err[3] > threshold {
                    continue;
                }
            }

            for j in 0..3 {
                if wm.triangles[ti].err[j] >= threshold {
                    continue;
                }
                let i0 = wm.triangles[ti].v[j];
                let i1 = wm.triangles[ti].v[(j + 1) % 3];

                // Collapsing across a boundary transition drags the contour
                // into the interior
                if self.preserve_boundary && wm.vertices[i0].border != wm.vertices[i1].border {
                    continue;
                }

                let (p, _) = evaluate_collapse(wm, i0, i1, self.preserve_boundary);

                deleted0.clear();
                deleted0.resize(wm.vertices[i0].tcount, false);
                deleted1.clear();
                deleted1.resize(wm.vertices[i1].tcount, false);
                if flipped(wm, p, i0, i1, &mut deleted0) {
                    continue;
                }
                if flipped(wm, p, i1, i0, &mut deleted1) {
                    continue;
                }

                // Accepted: move the surviving vertex, merge the quadrics,
                // and retarget both fans onto it
                wm.vertices[i0].p = p;
                let q1 = wm.vertices[i1].q;
                wm.vertices[i0].q += q1;

                let tstart = wm.refs.len();
                let mut removed = 0usize;
                let (s0, c0) = (wm.vertices[i0].tstart, wm.vertices[i0].tcount);
                let (s1, c1) = (wm.vertices[i1].tstart, wm.vertices[i1].tcount);
                update_triangles(wm, i0, s0, c0, &deleted0, self.preserve_boundary, &mut removed);
                update_triangles(wm, i0, s1, c1, &deleted1, self.preserve_boundary, &mut removed);
                *live -= removed;
                *collapses += 1;

                let tcount = wm.refs.len() - tstart;
                if tcount <= c0 {
                    // The merged fan fits into v0's existing range; reuse it
                    wm.refs.copy_within(tstart..tstart + tcount, s0);
                    wm.refs.truncate(tstart);
                } else {
                    wm.vertices[i0].tstart = tstart;
                }
                wm.vertices[i0].tcount = tcount;
                break;
            }
        }
    }
}

impl MeshSimplifier for QuadricDecimator {
    fn simplify(&self, mesh: &TriangleMesh, reduction_ratio: f32) -> Result<TriangleMesh> {
        if !(0.0..=1.0).contains(&reduction_ratio) {
            return Err(Error::InvalidData(
                "Reduction ratio must be between 0.0 and 1.0".to_string(),
            ));
        }
        if reduction_ratio == 0.0 {
            return Ok(mesh.clone());
        }

        let target = ((1.0 - reduction_ratio) as f64 * mesh.face_count() as f64).round() as usize;
        let decimation = self.decimate(mesh, target.max(MIN_TARGET_TRIANGLES))?;
        Ok(decimation.mesh)
    }
}

// ============================================================
// Collapse Evaluation
// ============================================================

/// A no-op result wrapping a clone of the input.
fn unchanged(mesh: &TriangleMesh, status: DecimationStatus) -> Decimation {
    Decimation {
        mesh: mesh.clone(),
        vertex_remap: (0..mesh.vertex_count()).map(Some).collect(),
        summary: DecimationSummary {
            input_triangles: mesh.face_count(),
            output_triangles: mesh.face_count(),
            rounds: 0,
            collapses: 0,
            status,
        },
    }
}

/// Optimal merge position and quadric error for collapsing an edge.
///
/// The combined quadric is minimized exactly when its 3x3 submatrix is
/// invertible; otherwise the position falls back to the candidates
/// `{v1, v2, midpoint}`, evaluated in that order with ties resolving to the
/// later candidate. Border-border edges are restricted to the fallback
/// candidates when `lock_border` is set so merged vertices stay on the
/// contour.
fn evaluate_collapse(
    wm: &WorkingMesh,
    id_v1: usize,
    id_v2: usize,
    lock_border: bool,
) -> (Vector3<f64>, f64) {
    let v1 = &wm.vertices[id_v1];
    let v2 = &wm.vertices[id_v2];
    let q = v1.q + v2.q;

    let border_locked = lock_border && v1.border && v2.border;
    if !border_locked {
        if let Some(p) = q.solve() {
            return (p, q.evaluate(&p).max(0.0));
        }
    }

    let p1 = v1.p;
    let p2 = v2.p;
    let p3 = (p1 + p2) * 0.5;
    let e1 = q.evaluate(&p1);
    let e2 = q.evaluate(&p2);
    let e3 = q.evaluate(&p3);
    let error = e1.min(e2).min(e3);
    let mut p = p1;
    if e2 == error {
        p = p2;
    }
    if e3 == error {
        p = p3;
    }
    (p, error.max(0.0))
}

/// Flip guard: true when moving vertex `i0` to `p` (collapsing the edge
/// toward `i1`) would fold or flatten any surviving triangle around `i0`.
///
/// Triangles that reference both edge endpoints are the ones removed by the
/// collapse itself; those are flagged in `deleted` instead of being
/// checked.
fn flipped(
    wm: &WorkingMesh,
    p: Vector3<f64>,
    i0: usize,
    i1: usize,
    deleted: &mut [bool],
) -> bool {
    let v0 = &wm.vertices[i0];
    for k in 0..v0.tcount {
        let r = wm.refs[v0.tstart + k];
        let t = &wm.triangles[r.tri];
        if t.deleted {
            continue;
        }

        let id1 = t.v[(r.slot + 1) % 3];
        let id2 = t.v[(r.slot + 2) % 3];
        if id1 == i1 || id2 == i1 {
            deleted[k] = true;
            continue;
        }

        let d1 = match (wm.vertices[id1].p - p).try_normalize(f64::EPSILON) {
            Some(d) => d,
            None => return true,
        };
        let d2 = match (wm.vertices[id2].p - p).try_normalize(f64::EPSILON) {
            Some(d) => d,
            None => return true,
        };
        if d1.dot(&d2).abs() > DEGENERATE_EDGE_DOT {
            return true;
        }
        let n = match d1.cross(&d2).try_normalize(f64::EPSILON) {
            Some(n) => n,
            None => return true,
        };
        if n.dot(&t.n) < FLIP_NORMAL_DOT {
            return true;
        }
    }
    false
}

/// Retarget the triangle fan recorded at `refs[tstart..tstart + tcount]`
/// onto the surviving vertex `i0`, tombstoning the fan members flagged in
/// `deleted` and refreshing the cached errors of the survivors. Surviving
/// entries are appended to the reference table so the caller can adopt them
/// as `i0`'s new fan.
fn update_triangles(
    wm: &mut WorkingMesh,
    i0: usize,
    tstart: usize,
    tcount: usize,
    deleted: &[bool],
    lock_border: bool,
    removed: &mut usize,
) {
    for k in 0..tcount {
        let r = wm.refs[tstart + k];
        if wm.triangles[r.tri].deleted {
            continue;
        }
        if deleted[k] {
            wm.triangles[r.tri].deleted = true;
            *removed += 1;
            continue;
        }

        wm.triangles[r.tri].v[r.slot] = i0;
        wm.triangles[r.tri].dirty = true;

        let v = wm.triangles[r.tri].v;
        let e0 = evaluate_collapse(wm, v[0], v[1], lock_border).1;
        let e1 = evaluate_collapse(wm, v[1], v[2], lock_border).1;
        let e2 = evaluate_collapse(wm, v[2], v[0], lock_border).1;
        wm.triangles[r.tri].err = [e0, e1, e2, e0.min(e1).min(e2)];
        wm.refs.push(r);
    }
}

/// Seed the cached per-edge collapse errors of every live triangle.
fn seed_edge_errors(wm: &mut WorkingMesh, lock_border: bool) {
    for ti in 0..wm.triangles.len() {
        if wm.triangles[ti].deleted {
            continue;
        }
        let v = wm.triangles[ti].v;
        let e0 = evaluate_collapse(wm, v[0], v[1], lock_border).1;
        let e1 = evaluate_collapse(wm, v[1], v[2], lock_border).1;
        let e2 = evaluate_collapse(wm, v[2], v[0], lock_border).1;
        wm.triangles[ti].err = [e0, e1, e2, e0.min(e1).min(e2)];
    }
}

/// Refresh the cached normals and edge errors of triangles touched by the
/// previous round, then clear every dirty flag.
fn refresh_dirty(wm: &mut WorkingMesh, lock_border: bool) {
    for ti in 0..wm.triangles.len() {
        if wm.triangles[ti].deleted || !wm.triangles[ti].dirty {
            continue;
        }
        if let Some(n) = wm.face_normal(&wm.triangles[ti]) {
            wm.triangles[ti].n = n;
        }
        let v = wm.triangles[ti].v;
        let e0 = evaluate_collapse(wm, v[0], v[1], lock_border).1;
        let e1 = evaluate_collapse(wm, v[1], v[2], lock_border).1;
        let e2 = evaluate_collapse(wm, v[2], v[0], lock_border).1;
        wm.triangles[ti].err = [e0, e1, e2, e0.min(e1).min(e2)];
    }
    for t in &mut wm.triangles {
        t.dirty = false;
    }
}
