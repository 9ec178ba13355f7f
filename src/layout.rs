//! Layout hierarchy: the multigrid of progressively coarser node sets.
//!
//! The finest layout has one node per working-set paper. Each coarsening
//! step contracts pairs of heavily linked nodes into single parent nodes,
//! roughly halving the graph; simulating a few iterations per level from
//! coarsest to finest converges far faster than relaxing the full graph
//! from scratch.

use crate::paper::{Paper, PaperId};

/// Index of a node within one layout level
pub type NodeId = usize;

/// Weighted directed link between two nodes of the same layout
#[derive(Debug, Clone, Copy)]
pub struct LayoutLink {
    pub target: NodeId,
    pub weight: f64,
}

/// One node of one layout level
#[derive(Debug, Clone)]
pub struct LayoutNode {
    pub x: f64,
    pub y: f64,
    /// Force accumulator, zeroed at the start of every iteration
    pub fx: f64,
    pub fy: f64,
    pub mass: f64,
    pub radius: f64,
    pub links: Vec<LayoutLink>,
    /// Node absorbing this one at the next coarser level
    pub parent: Option<NodeId>,
    /// First child at the next finer level; `None` only at level 0
    pub child1: Option<NodeId>,
    /// Second child, when this node contracted a pair
    pub child2: Option<NodeId>,
    /// Backing paper, at level 0 only
    pub paper: Option<PaperId>,
}

impl LayoutNode {
    fn with_mass(mass: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            fx: 0.0,
            fy: 0.0,
            mass,
            radius: (mass / std::f64::consts::PI).sqrt(),
            links: Vec::new(),
            parent: None,
            child1: None,
            child2: None,
            paper: None,
        }
    }

    /// Add `weight` to the link towards `target`, creating it if absent.
    fn add_link(&mut self, target: NodeId, weight: f64) {
        if let Some(link) = self.links.iter_mut().find(|l| l.target == target) {
            link.weight += weight;
        } else {
            self.links.push(LayoutLink { target, weight });
        }
    }
}

/// One level of the hierarchy
#[derive(Debug, Default)]
pub struct Layout {
    pub nodes: Vec<LayoutNode>,
    /// Total stored links, the coarsening stop criterion
    pub num_links: usize,
}

/// Attenuation for edges whose endpoints differ in age: identity at equal
/// ages, monotone decreasing, never zero.
fn age_weaken_factor(age_a: f64, age_b: f64) -> f64 {
    1.0 / (1.0 + 2.0 * (age_a - age_b).abs())
}

impl Layout {
    /// Build the finest layout from the conditioned working set.
    ///
    /// One node per paper, in working-set order; edges come from references
    /// plus fake links. Reference weights are 1, or 1/num_refs when
    /// `use_ref_freq` is set so prolific citers exert weaker per-edge pulls;
    /// fake links always weigh 1. With `age_weaken`, every weight is further
    /// attenuated by the endpoints' age difference.
    pub fn build_from_papers(
        papers: &[Paper],
        working: &[PaperId],
        use_ref_freq: bool,
        age_weaken: bool,
    ) -> Layout {
        let mut layout = Layout::default();

        // paper index -> node id, for link translation
        let mut node_of = vec![None; papers.len()];
        for (i, &pid) in working.iter().enumerate() {
            let p = &papers[pid];
            let mut node = LayoutNode::with_mass(p.mass);
            node.x = p.x;
            node.y = p.y;
            node.radius = p.r;
            node.paper = Some(pid);
            layout.nodes.push(node);
            node_of[pid] = Some(i);
        }

        for (i, &pid) in working.iter().enumerate() {
            let p = &papers[pid];
            let ref_weight = if use_ref_freq && !p.refs.is_empty() {
                1.0 / p.refs.len() as f64
            } else {
                1.0
            };
            for &r in &p.refs {
                let Some(target) = node_of[r] else { continue };
                let mut w = ref_weight;
                if age_weaken {
                    w *= age_weaken_factor(p.age, papers[r].age);
                }
                layout.nodes[i].add_link(target, w);
            }
            for &f in &p.fake_links {
                let Some(target) = node_of[f] else { continue };
                let mut w = 1.0;
                if age_weaken {
                    w *= age_weaken_factor(p.age, papers[f].age);
                }
                layout.nodes[i].add_link(target, w);
            }
        }

        layout.num_links = layout.nodes.iter().map(|n| n.links.len()).sum();
        layout.log_summary(0);
        layout
    }

    /// Build the next coarser layout by pair contraction, wiring up the
    /// parent pointers of `fine` as a side effect.
    ///
    /// Scanning nodes in index order, each unmatched node pairs with its
    /// heaviest-weight unmatched neighbour over the undirected adjacency
    /// (first-encountered heaviest on ties); leftovers become singleton
    /// parents. Parent links carry the summed weight of their children's
    /// cross-pair links; intra-pair links would be self-loops and are
    /// dropped.
    pub fn build_reduced(fine: &mut Layout, level: usize) -> Layout {
        let n = fine.nodes.len();
        let mut coarse = Layout::default();

        // links are stored once per edge, on the source; matching wants
        // neighbours in both directions
        let mut adjacency: Vec<Vec<(NodeId, f64)>> = vec![Vec::new(); n];
        for (i, node) in fine.nodes.iter().enumerate() {
            for link in &node.links {
                if link.target == i {
                    continue;
                }
                adjacency[i].push((link.target, link.weight));
                adjacency[link.target].push((i, link.weight));
            }
        }

        for i in 0..n {
            if fine.nodes[i].parent.is_some() {
                continue;
            }
            let mut best: Option<(NodeId, f64)> = None;
            for &(neighbour, weight) in &adjacency[i] {
                if fine.nodes[neighbour].parent.is_some() {
                    continue;
                }
                if best.map_or(true, |(_, w)| weight > w) {
                    best = Some((neighbour, weight));
                }
            }

            let parent_id = coarse.nodes.len();
            let mut mass = fine.nodes[i].mass;
            fine.nodes[i].parent = Some(parent_id);
            let mut parent = if let Some((j, _)) = best {
                mass += fine.nodes[j].mass;
                fine.nodes[j].parent = Some(parent_id);
                let mut p = LayoutNode::with_mass(mass);
                p.child1 = Some(i);
                p.child2 = Some(j);
                p
            } else {
                let mut p = LayoutNode::with_mass(mass);
                p.child1 = Some(i);
                p
            };
            // seed the parent where its first child sits; coarsen() refreshes
            // this whenever the caller actually navigates up
            parent.x = fine.nodes[i].x;
            parent.y = fine.nodes[i].y;
            coarse.nodes.push(parent);
        }

        for i in 0..n {
            let pa = match fine.nodes[i].parent {
                Some(p) => p,
                None => continue,
            };
            for j in 0..fine.nodes[i].links.len() {
                let link = fine.nodes[i].links[j];
                let pb = match fine.nodes[link.target].parent {
                    Some(p) => p,
                    None => continue,
                };
                if pa != pb {
                    coarse.nodes[pa].add_link(pb, link.weight);
                }
            }
        }

        coarse.num_links = coarse.nodes.iter().map(|n| n.links.len()).sum();

        #[cfg(debug_assertions)]
        {
            for p in &coarse.nodes {
                let mut sum = p.child1.map_or(0.0, |c| fine.nodes[c].mass);
                sum += p.child2.map_or(0.0, |c| fine.nodes[c].mass);
                debug_assert!((p.mass - sum).abs() < 1e-9);
            }
        }

        coarse.log_summary(level);
        coarse
    }

    pub fn total_mass(&self) -> f64 {
        self.nodes.iter().map(|n| n.mass).sum()
    }

    fn log_summary(&self, level: usize) {
        tracing::debug!(
            level,
            nodes = self.nodes.len(),
            links = self.num_links,
            mass = self.total_mass(),
            "built layout"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;

    fn working_papers(edges: &[(usize, usize)], n: usize) -> (Vec<Paper>, Vec<PaperId>) {
        let mut papers: Vec<Paper> = (0..n)
            .map(|i| {
                let mut p = Paper::new(i as u32, Category::HepTh, format!("p{i}"));
                p.index = i;
                p.mass = 1.0;
                p.r = (1.0 / std::f64::consts::PI).sqrt();
                p.included = true;
                p.connected = true;
                p
            })
            .collect();
        for &(src, dst) in edges {
            papers[src].refs.push(dst);
        }
        (papers, (0..n).collect())
    }

    #[test]
    fn finest_layout_mirrors_working_set() {
        let (papers, working) = working_papers(&[(1, 0), (2, 0)], 3);
        let l = Layout::build_from_papers(&papers, &working, false, false);
        assert_eq!(l.nodes.len(), 3);
        assert_eq!(l.num_links, 2);
        assert_eq!(l.nodes[1].links[0].target, 0);
        assert_eq!(l.nodes[0].paper, Some(0));
    }

    #[test]
    fn ref_freq_divides_weight_by_out_degree() {
        let (papers, working) = working_papers(&[(2, 0), (2, 1)], 3);
        let l = Layout::build_from_papers(&papers, &working, true, false);
        for link in &l.nodes[2].links {
            assert!((link.weight - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn age_weaken_attenuates_distant_ages() {
        let (mut papers, working) = working_papers(&[(1, 0), (2, 0)], 3);
        papers[0].age = 0.0;
        papers[1].age = 0.1;
        papers[2].age = 1.0;
        let l = Layout::build_from_papers(&papers, &working, false, true);
        let near = l.nodes[1].links[0].weight;
        let far = l.nodes[2].links[0].weight;
        assert!(near > far);
        assert!(far > 0.0);
    }

    #[test]
    fn reduction_contracts_heaviest_pair() {
        // 0-1 is the heavy edge, 2 hangs off 0 lightly
        let (mut papers, working) = working_papers(&[(1, 0), (2, 0)], 3);
        papers[1].refs.push(0); // double edge 1->0, aggregated weight 2
        let mut fine = Layout::build_from_papers(&papers, &working, false, false);
        assert!((fine.nodes[1].links[0].weight - 2.0).abs() < 1e-12);

        let coarse = Layout::build_reduced(&mut fine, 1);
        assert_eq!(coarse.nodes.len(), 2);
        // nodes 0 and 1 share a parent; 2 is a singleton
        assert_eq!(fine.nodes[0].parent, fine.nodes[1].parent);
        assert_ne!(fine.nodes[2].parent, fine.nodes[0].parent);
        // the 2->0 link survives as a cross-parent link
        assert_eq!(coarse.num_links, 1);
        // masses aggregate
        assert!((coarse.total_mass() - fine.total_mass()).abs() < 1e-9);
    }

    #[test]
    fn reduction_drops_self_loops() {
        let (papers, working) = working_papers(&[(1, 0)], 2);
        let mut fine = Layout::build_from_papers(&papers, &working, false, false);
        let coarse = Layout::build_reduced(&mut fine, 1);
        assert_eq!(coarse.nodes.len(), 1);
        assert_eq!(coarse.num_links, 0);
    }
}
