//! The map environment: owner of the paper arena, layout chain and all
//! simulation state, orchestrating one force-compute + integrate cycle per
//! `iterate` call.
//!
//! The driver (renderer/controller) calls `iterate` in a loop between
//! paints and may navigate the hierarchy or adjust parameters between
//! calls, never concurrently with one.

use crate::category::Category;
use crate::conditioner;
use crate::force::{self, ForceParams};
use crate::layout::{Layout, NodeId};
use crate::paper::{KeywordSet, Paper, PaperId};
use crate::quadtree::QuadTree;
use crate::tred;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Magnitude substituted for a non-finite per-node force
const OVERFLOW_FORCE: f64 = 1e100;

/// Centroid and population of one category over the working set
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryInfo {
    pub num: u32,
    pub x: f64,
    pub y: f64,
}

/// The simulation environment
pub struct MapEnv {
    all_papers: Vec<Paper>,
    keyword_set: KeywordSet,
    /// Included, connected papers of the current window, in arena order
    working: Vec<PaperId>,
    /// Layout chain, finest first
    layouts: Vec<Layout>,
    /// Level the simulation currently runs at
    active: usize,
    quad_tree: QuadTree,
    force_params: ForceParams,
    do_tred: bool,
    rng: StdRng,

    // Observation fields, read by the renderer
    energy: f64,
    progress: u32,
    step_size: f64,
    max_link_force_mag: f64,
    max_total_force_mag: f64,
    x_sd: f64,
    y_sd: f64,
    category_info: [CategoryInfo; Category::ALL.len()],
}

impl Default for MapEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl MapEnv {
    /// A fresh environment with an OS-seeded PRNG
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// A fresh environment with a fixed PRNG seed, for reproducible runs
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            all_papers: Vec::new(),
            keyword_set: KeywordSet::new(),
            working: Vec::new(),
            layouts: Vec::new(),
            active: 0,
            quad_tree: QuadTree::new(),
            force_params: ForceParams::default(),
            do_tred: false,
            rng,
            energy: 0.0,
            progress: 0,
            step_size: 0.1,
            max_link_force_mag: 0.0,
            max_total_force_mag: 0.0,
            x_sd: 1.0,
            y_sd: 1.0,
            category_info: [CategoryInfo::default(); Category::ALL.len()],
        }
    }

    /// Attach the paper arena and keyword source for the session.
    ///
    /// Papers must arrive sorted by id; indices are assigned here and
    /// citations are derived from the reference lists.
    pub fn set_papers(&mut self, mut papers: Vec<Paper>, keywords: KeywordSet) {
        debug_assert!(papers.windows(2).all(|w| w[0].id <= w[1].id));

        for (i, p) in papers.iter_mut().enumerate() {
            p.index = i;
            p.cites.clear();
            p.fake_links.clear();
            p.layout_node = None;
        }
        for i in 0..papers.len() {
            for j in 0..papers[i].refs.len() {
                let r = papers[i].refs[j];
                papers[r].cites.push(i);
            }
        }
        for i in 0..papers.len() {
            let p = &mut papers[i];
            p.refs_tred_computed = vec![0; p.refs.len()];
            p.num_included_cites = p.cites.len() as u32;
            p.mass = 0.05 + 0.2 * f64::from(p.num_included_cites);
            p.r = (p.mass / std::f64::consts::PI).sqrt();
            if !p.pos_valid {
                p.x = 100.0 * (self.rng.gen::<f64>() - 0.5);
                p.y = 100.0 * (self.rng.gen::<f64>() - 0.5);
            }
        }

        tracing::info!(papers = papers.len(), keywords = keywords.len(), "papers attached");
        self.all_papers = papers;
        self.keyword_set = keywords;
        self.working.clear();
        self.layouts.clear();
        self.active = 0;
    }

    /// Condition the graph to an id window and rebuild the layout chain.
    /// Returns the working-set size.
    pub fn select_date_range(&mut self, id_start: u32, id_end: u32, age_weaken: bool) -> usize {
        for p in &mut self.all_papers {
            p.layout_node = None;
        }

        self.working = conditioner::select(
            &mut self.all_papers,
            &mut self.keyword_set,
            id_start,
            id_end,
            self.do_tred,
            &mut self.rng,
        );

        self.layouts.clear();
        self.active = 0;
        self.energy = 0.0;
        self.progress = 0;
        self.category_info = [CategoryInfo::default(); Category::ALL.len()];

        if self.working.is_empty() {
            return 0;
        }

        let finest = Layout::build_from_papers(
            &self.all_papers,
            &self.working,
            self.force_params.use_ref_freq,
            age_weaken,
        );
        for (i, &pid) in self.working.iter().enumerate() {
            self.all_papers[pid].layout_node = Some(i);
        }
        self.layouts.push(finest);

        for level in 1..=10 {
            let top = self.layouts.len() - 1;
            if self.layouts[top].num_links <= 1 {
                break;
            }
            let coarse = Layout::build_reduced(&mut self.layouts[top], level);
            self.layouts.push(coarse);
        }
        self.active = self.layouts.len() - 1;

        // the coarsest level starts from scratch
        for n in &mut self.layouts[self.active].nodes {
            n.x = 100.0 * self.rng.gen::<f64>();
            n.y = 100.0 * self.rng.gen::<f64>();
        }

        self.step_size = 1.0;
        self.working.len()
    }

    /// One force-compute + integrate cycle. Returns whether the layout has
    /// converged (step size decayed to 0.1, or no forces at all).
    ///
    /// `hold_still` pins one paper's node for the duration of an external
    /// drag; `boost` kicks the step size back up after a manual change.
    pub fn iterate(&mut self, hold_still: Option<PaperId>, boost: bool) -> bool {
        if self.layouts.is_empty() || self.layouts[self.active].nodes.is_empty() {
            return true;
        }

        let at_finest = self.active == 0;
        self.max_link_force_mag = force::compute_forces(
            &self.force_params,
            self.do_tred,
            &self.all_papers,
            &self.working,
            &mut self.layouts[self.active],
            at_finest,
            &mut self.quad_tree,
        );

        if boost {
            if self.step_size < 1.0 {
                self.step_size = 2.0;
            } else {
                self.step_size *= 2.0;
            }
        }

        // close repulsion blows up with large steps
        if self.force_params.do_close_repulsion {
            self.step_size = self.step_size.min(1.0);
        }

        let hold_node = self.resolve_hold_node(hold_still);

        let mut energy = 0.0;
        let mut x_sum = 0.0;
        let mut y_sum = 0.0;
        let mut xsq_sum = 0.0;
        let mut ysq_sum = 0.0;
        let mut total_mass = 0.0;
        let mut max_fmag: f64 = 0.0;
        let step_size = self.step_size;

        {
            let layout = &mut self.layouts[self.active];
            for (i, n) in layout.nodes.iter_mut().enumerate() {
                n.fx /= n.mass;
                n.fy /= n.mass;

                let mut fmag = (n.fx * n.fx + n.fy * n.fy).sqrt();
                let mut displace = fmag > 0.0;
                if !fmag.is_finite() {
                    // overflow recovery: clamp the reported magnitude and
                    // hold the node, keeping every position finite
                    fmag = OVERFLOW_FORCE;
                    displace = false;
                }
                max_fmag = max_fmag.max(fmag);
                energy += fmag;

                if hold_node == Some(i) {
                    displace = false;
                }
                if displace {
                    let dt = step_size / fmag;
                    n.x += dt * n.fx;
                    n.y += dt * n.fy;
                }

                x_sum += n.x * n.mass;
                y_sum += n.y * n.mass;
                xsq_sum += n.x * n.x * n.mass;
                ysq_sum += n.y * n.y * n.mass;
                total_mass += n.mass;
            }
        }

        self.max_total_force_mag = max_fmag;

        // recentre on the centre of mass
        x_sum /= total_mass;
        y_sum /= total_mass;
        for n in &mut self.layouts[self.active].nodes {
            n.x -= x_sum;
            n.y -= y_sum;
        }

        xsq_sum /= total_mass;
        ysq_sum /= total_mass;
        self.x_sd = (xsq_sum - x_sum * x_sum).max(0.0).sqrt();
        self.y_sd = (ysq_sum - y_sum * y_sum).max(0.0).sqrt();

        self.propagate_positions();
        self.compute_category_locations();

        #[cfg(debug_assertions)]
        for &pid in &self.working {
            debug_assert!(self.all_papers[pid].x.is_finite());
            debug_assert!(self.all_papers[pid].y.is_finite());
        }

        // adapt the step size from the energy trend
        if !energy.is_finite() {
            self.step_size = 2.0;
        } else if energy < self.energy {
            if self.progress < 3 {
                self.progress += 1;
            } else if self.step_size < 5.0 {
                self.step_size *= 1.3;
            }
        } else {
            self.progress = 0;
            if self.step_size > 0.025 {
                self.step_size *= 0.95;
            }
        }
        self.energy = energy;

        // while overlaps remain the close repulsion dominates; keep going
        if self.force_params.do_close_repulsion
            && self.max_total_force_mag > self.max_link_force_mag * self.max_link_force_mag
        {
            if self.step_size < 0.15 {
                self.step_size = 0.15;
            }
            return false;
        }

        if energy == 0.0 {
            return true;
        }
        self.step_size <= 0.1
    }

    /// Walk a paper's level-0 node up to the active level.
    fn resolve_hold_node(&self, hold_still: Option<PaperId>) -> Option<NodeId> {
        let mut nid = self
            .all_papers
            .get(hold_still?)
            .and_then(|p| p.layout_node)?;
        for level in 0..self.active {
            nid = self.layouts[level].nodes[nid].parent?;
        }
        Some(nid)
    }

    /// Copy positions from the active layout down through every finer
    /// level, and finally into the papers themselves.
    fn propagate_positions(&mut self) {
        for level in (1..=self.active).rev() {
            let (finer, coarser) = self.layouts.split_at_mut(level);
            let fine = &mut finer[level - 1];
            let coarse = &coarser[0];
            for n in &coarse.nodes {
                if let Some(c) = n.child1 {
                    fine.nodes[c].x = n.x;
                    fine.nodes[c].y = n.y;
                }
                if let Some(c) = n.child2 {
                    fine.nodes[c].x = n.x;
                    fine.nodes[c].y = n.y;
                }
            }
        }
        for n in &self.layouts[0].nodes {
            if let Some(pid) = n.paper {
                self.all_papers[pid].x = n.x;
                self.all_papers[pid].y = n.y;
            }
        }
    }

    fn compute_category_locations(&mut self) {
        for cat in &mut self.category_info {
            *cat = CategoryInfo::default();
        }
        for &pid in &self.working {
            let p = &self.all_papers[pid];
            let cat = &mut self.category_info[p.allcats[0].index()];
            cat.num += 1;
            cat.x += p.x;
            cat.y += p.y;
        }
        for cat in &mut self.category_info {
            if cat.num > 0 {
                cat.x /= f64::from(cat.num);
                cat.y /= f64::from(cat.num);
            }
        }
    }

    // --- hierarchy navigation ---

    pub fn number_of_coarser_layouts(&self) -> usize {
        self.layouts.len().saturating_sub(self.active + 1)
    }

    pub fn number_of_finer_layouts(&self) -> usize {
        self.active
    }

    /// Navigate up one level; each parent takes its first child's position
    /// so the laid-out geometry carries over.
    pub fn coarsen(&mut self) {
        if self.active + 1 >= self.layouts.len() {
            return;
        }
        self.active += 1;
        let (finer, coarser) = self.layouts.split_at_mut(self.active);
        let fine = &finer[self.active - 1];
        let coarse = &mut coarser[0];
        for n in &mut coarse.nodes {
            if let Some(c) = n.child1 {
                n.x = fine.nodes[c].x;
                n.y = fine.nodes[c].y;
            }
        }
    }

    /// Navigate down one level; siblings split laterally around their
    /// parent so the pair's centre of mass stays put.
    pub fn refine(&mut self) {
        if self.active == 0 {
            return;
        }
        self.active -= 1;
        let (finer, coarser) = self.layouts.split_at_mut(self.active + 1);
        let fine = &mut finer[self.active];
        let coarse = &coarser[0];
        for i in 0..fine.nodes.len() {
            let Some(pi) = fine.nodes[i].parent else { continue };
            let parent = &coarse.nodes[pi];
            if parent.child2.is_none() {
                fine.nodes[i].x = parent.x;
                fine.nodes[i].y = parent.y;
            } else {
                let offset = (1.0 - fine.nodes[i].mass / parent.mass) * parent.radius;
                let side = if parent.child1 == Some(i) { -1.0 } else { 1.0 };
                fine.nodes[i].x = parent.x + side * offset;
                fine.nodes[i].y = parent.y;
            }
        }
    }

    // --- rigid transforms and perturbation ---

    /// Displace every active-layout node uniformly in (-amt/2, +amt/2)
    pub fn jolt(&mut self, amt: f64) {
        let Some(layout) = self.layouts.get_mut(self.active) else { return };
        for n in &mut layout.nodes {
            n.x += amt * (self.rng.gen::<f64>() - 0.5);
            n.y += amt * (self.rng.gen::<f64>() - 0.5);
        }
    }

    pub fn rotate_all(&mut self, angle: f64) {
        let (s, c) = angle.sin_cos();
        let Some(layout) = self.layouts.get_mut(self.active) else { return };
        for n in &mut layout.nodes {
            let (x, y) = (n.x, n.y);
            n.x = c * x - s * y;
            n.y = s * x + c * y;
        }
    }

    pub fn flip_x(&mut self) {
        let Some(layout) = self.layouts.get_mut(self.active) else { return };
        for n in &mut layout.nodes {
            n.x = -n.x;
        }
    }

    /// Hit-test in world coordinates: the first working-set paper whose
    /// disc contains the point.
    pub fn paper_at_world(&self, x: f64, y: f64) -> Option<PaperId> {
        self.working.iter().copied().find(|&pid| {
            let p = &self.all_papers[pid];
            let dx = p.x - x;
            let dy = p.y - y;
            dx * dx + dy * dy < p.r * p.r
        })
    }

    // --- force-parameter controls ---

    pub fn toggle_do_close_repulsion(&mut self) {
        self.force_params.do_close_repulsion = !self.force_params.do_close_repulsion;
    }

    pub fn toggle_use_ref_freq(&mut self) {
        self.force_params.use_ref_freq = !self.force_params.use_ref_freq;
    }

    pub fn toggle_do_tred(&mut self) {
        self.do_tred = !self.do_tred;
        // the reduction may not have run at selection time
        if self.do_tred {
            tred::compute(&mut self.all_papers);
        }
    }

    pub fn adjust_anti_gravity(&mut self, amt: f64) {
        self.force_params.anti_gravity_strength *= amt;
    }

    pub fn adjust_link_strength(&mut self, amt: f64) {
        self.force_params.link_strength *= amt;
    }

    pub fn adjust_close_repulsion(&mut self, amt_a: f64, amt_b: f64) {
        self.force_params.close_repulsion_a *= amt_a;
        self.force_params.close_repulsion_b *= amt_b;
    }

    pub fn adjust_close_repulsion2(&mut self, amt_c: f64, amt_d: f64) {
        self.force_params.close_repulsion_c *= amt_c;
        self.force_params.close_repulsion_d += amt_d;
    }

    pub fn set_force_params(&mut self, params: ForceParams) {
        self.force_params = params;
    }

    // --- observation ---

    pub fn num_papers(&self) -> usize {
        self.working.len()
    }

    /// Id range spanned by the whole arena
    pub fn max_id_range(&self) -> (u32, u32) {
        match (self.all_papers.first(), self.all_papers.last()) {
            (Some(first), Some(last)) => (first.id, last.id),
            _ => (0, 0),
        }
    }

    pub fn papers(&self) -> &[Paper] {
        &self.all_papers
    }

    pub fn working_set(&self) -> &[PaperId] {
        &self.working
    }

    /// Nodes of the level the simulation currently runs at; what a
    /// renderer draws when not at the finest level
    pub fn active_layout(&self) -> Option<&Layout> {
        self.layouts.get(self.active)
    }

    pub fn force_params(&self) -> &ForceParams {
        &self.force_params
    }

    pub fn do_tred(&self) -> bool {
        self.do_tred
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    pub fn max_link_force_mag(&self) -> f64 {
        self.max_link_force_mag
    }

    pub fn max_total_force_mag(&self) -> f64 {
        self.max_total_force_mag
    }

    pub fn x_sd(&self) -> f64 {
        self.x_sd
    }

    pub fn y_sd(&self) -> f64 {
        self.y_sd
    }

    pub fn category_info(&self, cat: Category) -> &CategoryInfo {
        &self.category_info[cat.index()]
    }
}
