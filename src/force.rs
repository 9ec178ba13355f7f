//! Force parameters and the per-iteration force pass.
//!
//! Every iteration accumulates, in order: attractive spring forces along
//! links, then Barnes-Hut anti-gravity (plus short-range repulsion when
//! enabled) via the quadtree. All forces land in the layout nodes' fx/fy
//! accumulators; the integrator in `env` turns them into displacements.

use crate::layout::Layout;
use crate::paper::{Paper, PaperId};
use crate::quadtree::QuadTree;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// All tunable force parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForceParams {
    /// Steep short-range repulsion that resolves disc overlap
    pub do_close_repulsion: bool,
    pub close_repulsion_a: f64,
    pub close_repulsion_b: f64,
    pub close_repulsion_c: f64,
    /// Contact range as a multiple of the summed radii
    pub close_repulsion_d: f64,
    /// Divide each reference's pull by the source's reference count
    pub use_ref_freq: bool,
    pub anti_gravity_strength: f64,
    pub link_strength: f64,
    /// Barnes-Hut opening criterion: a cell is far when s/d < theta.
    /// 0 disables the approximation entirely (exact N² sum).
    #[serde(default = "default_theta")]
    pub theta: f64,
}

fn default_theta() -> f64 {
    1.0
}

impl Default for ForceParams {
    fn default() -> Self {
        Self {
            do_close_repulsion: false,
            close_repulsion_a: 1e8,
            close_repulsion_b: 1e16,
            close_repulsion_c: 1.1,
            close_repulsion_d: 0.6,
            use_ref_freq: true,
            anti_gravity_strength: 1.0,
            link_strength: 4.0,
            theta: 1.0,
        }
    }
}

impl ForceParams {
    /// Load parameters from a JSON file, falling back to defaults if the
    /// file is missing or malformed
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(params) => params,
                Err(e) => {
                    tracing::warn!("failed to parse force params {:?}: {}, using defaults", path, e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Save parameters as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

/// Accumulate all forces for one iteration into the layout's fx/fy and
/// return the maximum link-force magnitude (observation only).
pub(crate) fn compute_forces(
    params: &ForceParams,
    do_tred: bool,
    papers: &[Paper],
    working: &[PaperId],
    layout: &mut Layout,
    at_finest: bool,
    quad_tree: &mut QuadTree,
) -> f64 {
    for n in &mut layout.nodes {
        n.fx = 0.0;
        n.fy = 0.0;
    }

    if do_tred && at_finest {
        attract_tred_refs(params, papers, working, layout);
    } else {
        attract_links(params, layout);
    }

    let mut max_fsq: f64 = 0.0;
    for n in &layout.nodes {
        max_fsq = max_fsq.max(n.fx * n.fx + n.fy * n.fy);
    }
    let max_link_force = max_fsq.sqrt();

    quad_tree.build(layout);
    quad_tree.apply_forces(params, layout);

    max_link_force
}

/// Spring along every layout link: rest length is the touching distance
/// (sum of radii), force grows linearly with the surplus separation, equal
/// and opposite on both ends.
fn attract_links(params: &ForceParams, layout: &mut Layout) {
    for a in 0..layout.nodes.len() {
        for j in 0..layout.nodes[a].links.len() {
            let link = layout.nodes[a].links[j];
            spring(params, layout, a, link.target, link.weight);
        }
    }
}

/// Finest-level spring pass under transitive reduction: pull along paper
/// references surviving the reduction, weighted by their computed tred
/// weight, plus fake links at weight 1. Eliminated references exert no pull.
fn attract_tred_refs(params: &ForceParams, papers: &[Paper], working: &[PaperId], layout: &mut Layout) {
    for &pid in working {
        let p = &papers[pid];
        let Some(a) = p.layout_node else { continue };
        for (j, &r) in p.refs.iter().enumerate() {
            let w = p.refs_tred_computed.get(j).copied().unwrap_or(1);
            if w == 0 {
                continue;
            }
            let Some(b) = papers[r].layout_node else { continue };
            spring(params, layout, a, b, f64::from(w));
        }
        for &f in &p.fake_links {
            let Some(b) = papers[f].layout_node else { continue };
            spring(params, layout, a, b, 1.0);
        }
    }
}

fn spring(params: &ForceParams, layout: &mut Layout, a: usize, b: usize, weight: f64) {
    if a == b {
        return;
    }
    let (ax, ay, ar) = {
        let n = &layout.nodes[a];
        (n.x, n.y, n.radius)
    };
    let (bx, by, br) = {
        let n = &layout.nodes[b];
        (n.x, n.y, n.radius)
    };
    let dx = bx - ax;
    let dy = by - ay;
    let dist = (dx * dx + dy * dy).sqrt();
    if dist < 1e-9 {
        return;
    }
    let rest_len = ar + br;
    let fac = weight * params.link_strength * (dist - rest_len) / dist;
    let fx = dx * fac;
    let fy = dy * fac;
    layout.nodes[a].fx += fx;
    layout.nodes[a].fy += fy;
    layout.nodes[b].fx -= fx;
    layout.nodes[b].fy -= fy;
}
