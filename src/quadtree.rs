//! Barnes-Hut quadtree for O(n log n) anti-gravity.
//!
//! Instead of summing repulsion over all pairs of nodes O(n²), distant
//! clusters are approximated by their centre of mass. The node pool is
//! owned across iterations and cleared rather than freed, since the tree
//! is rebuilt from scratch every step.

use crate::force::ForceParams;
use crate::layout::{Layout, LayoutNode, NodeId};

/// Index of a node in the quadtree pool
type QuadId = usize;

/// Two coincident points closer than this are merged into one leaf
const COINCIDENT_EPS_SQ: f64 = 1e-18;

/// Pairs closer than this contribute no force (covers a node meeting its
/// own leaf)
const MIN_DIST_SQ: f64 = 1e-4;

#[derive(Debug, Clone)]
struct QuadNode {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
    num_items: usize,
    mass: f64,
    /// Centre of mass of everything below this cell
    x: f64,
    y: f64,
    /// Children: q0 (-,-), q1 (+,-), q2 (-,+), q3 (+,+)
    q: [Option<QuadId>; 4],
    /// Leaf payload
    node: Option<NodeId>,
}

impl QuadNode {
    fn empty(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
            num_items: 0,
            mass: 0.0,
            x: 0.0,
            y: 0.0,
            q: [None; 4],
            node: None,
        }
    }

    fn quadrant_of(&self, x: f64, y: f64) -> usize {
        let mid_x = 0.5 * (self.min_x + self.max_x);
        let mid_y = 0.5 * (self.min_y + self.max_y);
        match (x >= mid_x, y >= mid_y) {
            (false, false) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (true, true) => 3,
        }
    }

    fn quadrant_bounds(&self, quadrant: usize) -> (f64, f64, f64, f64) {
        let mid_x = 0.5 * (self.min_x + self.max_x);
        let mid_y = 0.5 * (self.min_y + self.max_y);
        match quadrant {
            0 => (self.min_x, self.min_y, mid_x, mid_y),
            1 => (mid_x, self.min_y, self.max_x, mid_y),
            2 => (self.min_x, mid_y, mid_x, self.max_y),
            _ => (mid_x, mid_y, self.max_x, self.max_y),
        }
    }

    fn side(&self) -> f64 {
        self.max_x - self.min_x
    }
}

/// The tree itself: a pool of cells reused across rebuilds
#[derive(Debug, Default)]
pub struct QuadTree {
    pool: Vec<QuadNode>,
    root: Option<QuadId>,
}

impl QuadTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the tree over the given layout's nodes.
    pub fn build(&mut self, layout: &Layout) {
        self.pool.clear();
        self.root = None;

        if layout.nodes.is_empty() {
            return;
        }

        // bounding square just enclosing all nodes
        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;
        for n in &layout.nodes {
            min_x = min_x.min(n.x);
            min_y = min_y.min(n.y);
            max_x = max_x.max(n.x);
            max_y = max_y.max(n.y);
        }
        let side = (max_x - min_x).max(max_y - min_y).max(1e-6);
        max_x = min_x + side;
        max_y = min_y + side;

        let root = self.alloc(min_x, min_y, max_x, max_y);
        self.root = Some(root);
        for (i, n) in layout.nodes.iter().enumerate() {
            self.insert(root, i, n.x, n.y, n.mass);
        }
    }

    fn alloc(&mut self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> QuadId {
        self.pool.push(QuadNode::empty(min_x, min_y, max_x, max_y));
        self.pool.len() - 1
    }

    fn insert(&mut self, q: QuadId, node: NodeId, x: f64, y: f64, mass: f64) {
        let cell = &self.pool[q];

        if cell.num_items == 0 {
            let cell = &mut self.pool[q];
            cell.num_items = 1;
            cell.mass = mass;
            cell.x = x;
            cell.y = y;
            cell.node = Some(node);
            return;
        }

        if let Some(resident) = cell.node {
            // a leaf: one point, or an aggregate of coincident points
            let (ox, oy, omass, oitems) = (cell.x, cell.y, cell.mass, cell.num_items);
            let dx = x - ox;
            let dy = y - oy;
            if dx * dx + dy * dy < COINCIDENT_EPS_SQ {
                // coincident: stop subdividing, fold into the aggregate
                let cell = &mut self.pool[q];
                cell.num_items += 1;
                cell.mass += mass;
                return;
            }
            // split: move the resident down into its quadrant as-is, then
            // recurse for the new point
            let oq = cell.quadrant_of(ox, oy);
            let (a, b, c, d) = cell.quadrant_bounds(oq);
            let child = self.alloc(a, b, c, d);
            {
                let cell = &mut self.pool[q];
                cell.q[oq] = Some(child);
                cell.node = None;
            }
            {
                let ch = &mut self.pool[child];
                ch.num_items = oitems;
                ch.mass = omass;
                ch.x = ox;
                ch.y = oy;
                ch.node = Some(resident);
            }
            self.insert_into_child(q, node, x, y, mass);
            let total = omass + mass;
            let cell = &mut self.pool[q];
            cell.num_items = oitems + 1;
            cell.x = (ox * omass + x * mass) / total;
            cell.y = (oy * omass + y * mass) / total;
            cell.mass = total;
            return;
        }

        // internal: fold into the aggregate and descend
        let total = cell.mass + mass;
        let (cx, cy, cmass) = (cell.x, cell.y, cell.mass);
        self.insert_into_child(q, node, x, y, mass);
        let cell = &mut self.pool[q];
        cell.num_items += 1;
        cell.x = (cx * cmass + x * mass) / total;
        cell.y = (cy * cmass + y * mass) / total;
        cell.mass = total;
    }

    fn insert_into_child(&mut self, q: QuadId, node: NodeId, x: f64, y: f64, mass: f64) {
        let cell = &self.pool[q];
        let quadrant = cell.quadrant_of(x, y);
        let child = match cell.q[quadrant] {
            Some(c) => c,
            None => {
                let (a, b, c, d) = cell.quadrant_bounds(quadrant);
                let child = self.alloc(a, b, c, d);
                self.pool[q].q[quadrant] = Some(child);
                child
            }
        };
        self.insert(child, node, x, y, mass);
    }

    /// Total mass held by the tree
    pub fn total_mass(&self) -> f64 {
        self.root.map_or(0.0, |r| self.pool[r].mass)
    }

    /// Centre of mass of the whole tree
    pub fn centre_of_mass(&self) -> (f64, f64) {
        self.root.map_or((0.0, 0.0), |r| (self.pool[r].x, self.pool[r].y))
    }

    /// Accumulate anti-gravity (and, when enabled, short-range repulsion)
    /// into every node's force accumulator.
    pub fn apply_forces(&self, params: &ForceParams, layout: &mut Layout) {
        let Some(root) = self.root else { return };

        let mut acc = vec![(0.0f64, 0.0f64); layout.nodes.len()];
        for (i, (fx, fy)) in acc.iter_mut().enumerate() {
            let n = &layout.nodes[i];
            self.force_on(root, n, params, &layout.nodes, fx, fy);
        }
        for (n, (fx, fy)) in layout.nodes.iter_mut().zip(acc) {
            n.fx += fx;
            n.fy += fy;
        }
    }

    fn force_on(
        &self,
        q: QuadId,
        n: &LayoutNode,
        params: &ForceParams,
        nodes: &[LayoutNode],
        fx: &mut f64,
        fy: &mut f64,
    ) {
        let cell = &self.pool[q];
        if cell.num_items == 0 {
            return;
        }

        let dx = n.x - cell.x;
        let dy = n.y - cell.y;
        let rsq = dx * dx + dy * dy;

        if cell.node.is_some() {
            // leaf (possibly a coincident aggregate): direct interaction
            if rsq <= MIN_DIST_SQ {
                return;
            }
            let r = rsq.sqrt();
            if params.do_close_repulsion {
                if let Some(other) = cell.node {
                    let contact =
                        (n.radius + nodes[other].radius) * params.close_repulsion_d + 0.1;
                    if r < contact {
                        // close kernel, negative within contact range for the
                        // default parameters; applied towards the neighbour so
                        // the pair is pushed apart
                        let fac = params.close_repulsion_a / r.powf(params.close_repulsion_c)
                            - params.close_repulsion_b / r.powf(2.0 * params.close_repulsion_c);
                        *fx -= dx / r * fac;
                        *fy -= dy / r * fac;
                        return;
                    }
                }
            }
            let fac = params.anti_gravity_strength * n.mass * cell.mass / rsq;
            *fx += dx * fac;
            *fy += dy * fac;
        } else if cell.side() * cell.side() < params.theta * params.theta * rsq {
            // far enough: treat the whole cell as one body at its centre of mass
            if rsq <= MIN_DIST_SQ {
                return;
            }
            let fac = params.anti_gravity_strength * n.mass * cell.mass / rsq;
            *fx += dx * fac;
            *fy += dy * fac;
        } else {
            for child in cell.q.iter().flatten() {
                self.force_on(*child, n, params, nodes, fx, fy);
            }
        }
    }
}
