//! Cross-module simulation scenarios: whole-engine behaviour that no
//! single module test can cover.

use crate::category::Category;
use crate::env::MapEnv;
use crate::force::{self, ForceParams};
use crate::layout::Layout;
use crate::paper::{KeywordSet, Paper, PaperId};
use crate::quadtree::QuadTree;

const BASE_ID: u32 = 1000;

fn papers_with(edges: &[(usize, usize)], n: usize) -> Vec<Paper> {
    let mut papers: Vec<Paper> = (0..n)
        .map(|i| Paper::new(BASE_ID + i as u32, Category::HepTh, format!("p{i}")))
        .collect();
    for &(src, dst) in edges {
        papers[src].refs.push(dst);
    }
    papers
}

fn env_with(edges: &[(usize, usize)], n: usize) -> MapEnv {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut env = MapEnv::with_seed(42);
    env.set_papers(papers_with(edges, n), KeywordSet::new());
    env.select_date_range(BASE_ID, BASE_ID + n as u32 - 1, false);
    env
}

fn refine_to_finest(env: &mut MapEnv) {
    while env.number_of_finer_layouts() > 0 {
        env.refine();
    }
}

fn run(env: &mut MapEnv, max_iters: usize) -> bool {
    for _ in 0..max_iters {
        if env.iterate(None, false) {
            return true;
        }
    }
    false
}

fn dist(a: &Paper, b: &Paper) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

fn active_positions(env: &MapEnv) -> Vec<(f64, f64)> {
    env.active_layout()
        .map(|l| l.nodes.iter().map(|n| (n.x, n.y)).collect())
        .unwrap_or_default()
}

// --- invariants ---

#[test]
fn recentring_zeroes_the_weighted_centroid() {
    let mut env = env_with(&[(1, 0), (2, 0)], 3);
    refine_to_finest(&mut env);
    for _ in 0..10 {
        env.iterate(None, false);
        let layout = env.active_layout().unwrap();
        let mx: f64 = layout.nodes.iter().map(|n| n.mass * n.x).sum();
        let my: f64 = layout.nodes.iter().map(|n| n.mass * n.y).sum();
        assert!(mx.abs() < 1e-6, "sum m*x = {mx}");
        assert!(my.abs() < 1e-6, "sum m*y = {my}");
    }
}

#[test]
fn jolt_zero_is_identity() {
    let mut env = env_with(&[(1, 0), (2, 0)], 3);
    let before = active_positions(&env);
    env.jolt(0.0);
    assert_eq!(before, active_positions(&env));
}

#[test]
fn rotate_full_turn_is_identity() {
    let mut env = env_with(&[(1, 0), (2, 0), (3, 1)], 4);
    let before = active_positions(&env);
    env.rotate_all(2.0 * std::f64::consts::PI);
    for (b, a) in before.iter().zip(active_positions(&env)) {
        assert!((b.0 - a.0).abs() < 1e-9);
        assert!((b.1 - a.1).abs() < 1e-9);
    }
}

#[test]
fn rotate_there_and_back_is_identity() {
    let mut env = env_with(&[(1, 0), (2, 0), (3, 1)], 4);
    let before = active_positions(&env);
    env.rotate_all(0.7);
    env.rotate_all(-0.7);
    for (b, a) in before.iter().zip(active_positions(&env)) {
        assert!((b.0 - a.0).abs() < 1e-9);
        assert!((b.1 - a.1).abs() < 1e-9);
    }
}

#[test]
fn flip_x_twice_is_identity() {
    let mut env = env_with(&[(1, 0), (2, 0)], 3);
    let before = active_positions(&env);
    env.flip_x();
    env.flip_x();
    assert_eq!(before, active_positions(&env));
}

#[test]
fn coarsen_and_refine_restore_the_level() {
    let mut env = env_with(&[(1, 0), (2, 0)], 3);
    refine_to_finest(&mut env);
    let finer = env.number_of_finer_layouts();
    let coarser = env.number_of_coarser_layouts();
    env.coarsen();
    env.refine();
    assert_eq!(env.number_of_finer_layouts(), finer);
    assert_eq!(env.number_of_coarser_layouts(), coarser);
}

#[test]
fn coarsen_copies_first_child_positions() {
    let mut env = env_with(&[(1, 0), (2, 0)], 3);
    refine_to_finest(&mut env);
    let fine_positions = active_positions(&env);
    env.coarsen();
    let coarse = env.active_layout().unwrap();
    for n in &coarse.nodes {
        let c1 = n.child1.unwrap();
        assert_eq!((n.x, n.y), fine_positions[c1]);
    }
}

#[test]
fn refine_preserves_pair_centre_of_mass() {
    let mut env = env_with(&[(1, 0), (2, 0), (3, 2), (4, 3)], 5);
    // at the coarsest level; capture it, then step down one level
    let coarse_positions = active_positions(&env);
    let parents: Vec<(Option<usize>, Option<usize>, f64)> = env
        .active_layout()
        .unwrap()
        .nodes
        .iter()
        .map(|n| (n.child1, n.child2, n.mass))
        .collect();
    env.refine();
    let fine = env.active_layout().unwrap();
    for (pi, &(c1, c2, pmass)) in parents.iter().enumerate() {
        let (px, py) = coarse_positions[pi];
        match (c1, c2) {
            (Some(a), Some(b)) => {
                let na = &fine.nodes[a];
                let nb = &fine.nodes[b];
                let cx = (na.mass * na.x + nb.mass * nb.x) / pmass;
                let cy = (na.mass * na.y + nb.mass * nb.y) / pmass;
                assert!((cx - px).abs() < 1e-9);
                assert!((cy - py).abs() < 1e-9);
            }
            (Some(a), None) => {
                assert_eq!((fine.nodes[a].x, fine.nodes[a].y), (px, py));
            }
            _ => panic!("parent without children"),
        }
    }
}

#[test]
fn hold_still_pins_the_dragged_paper() {
    // with one end held, the gap closes at half the rate
    let mut held = env_with(&[(1, 0)], 2);
    let mut free = env_with(&[(1, 0)], 2);

    let gap_of = |env: &MapEnv| {
        let l = env.active_layout().unwrap();
        ((l.nodes[0].x - l.nodes[1].x).powi(2) + (l.nodes[0].y - l.nodes[1].y).powi(2)).sqrt()
    };
    let gap_before = gap_of(&held);
    assert_eq!(gap_before, gap_of(&free), "same seed, same start");

    held.iterate(Some(0), false);
    free.iterate(None, false);
    let held_shrink = gap_before - gap_of(&held);
    let free_shrink = gap_before - gap_of(&free);

    assert!(held_shrink.abs() > 0.0);
    assert!(free_shrink.abs() > 1.5 * held_shrink.abs());
}

#[test]
fn boost_kicks_the_step_size_back_up() {
    let mut env = env_with(&[(1, 0), (2, 0)], 3);
    for _ in 0..20 {
        env.iterate(None, false);
    }
    let before = env.step_size();
    env.iterate(None, true);
    assert!(env.step_size() > before);
}

// --- concrete scenarios ---

#[test]
fn star_settles_symmetrically() {
    // P0 cited by P1 and P2: both satellites end up at the same distance
    let mut env = env_with(&[(1, 0), (2, 0)], 3);
    refine_to_finest(&mut env);
    for _ in 0..450 {
        env.iterate(None, false);
    }
    // average out the residual bounce of the fixed-length stepper
    let mut d1 = 0.0;
    let mut d2 = 0.0;
    for _ in 0..50 {
        env.iterate(None, false);
        d1 += dist(&env.papers()[1], &env.papers()[0]);
        d2 += dist(&env.papers()[2], &env.papers()[0]);
    }
    d1 /= 50.0;
    d2 /= 50.0;
    let rel = (d1 - d2).abs() / d1.max(d2);
    assert!(rel < 0.05, "asymmetry {rel}, d1 {d1}, d2 {d2}");
}

#[test]
fn chain_straightens_into_monotone_curve() {
    let edges: Vec<(usize, usize)> = (1..10).map(|i| (i, i - 1)).collect();
    let mut env = env_with(&edges, 10);
    refine_to_finest(&mut env);
    run(&mut env, 5000);

    // project everything onto the end-to-end axis
    let papers = env.papers();
    let ux = papers[9].x - papers[0].x;
    let uy = papers[9].y - papers[0].y;
    let len = (ux * ux + uy * uy).sqrt();
    assert!(len > 1.0, "chain collapsed");
    let t: Vec<f64> = (0..10)
        .map(|i| ((papers[i].x - papers[0].x) * ux + (papers[i].y - papers[0].y) * uy) / len)
        .collect();
    for w in t.windows(2) {
        assert!(w[0] < w[1], "projections not monotone: {t:?}");
    }
}

#[test]
fn cliques_stay_tighter_than_their_separation() {
    // two 5-cliques with no edges between them, relaxed directly on a
    // hand-conditioned layout
    let mut edges = Vec::new();
    for clique in 0..2usize {
        let base = clique * 5;
        for i in 0..5 {
            for j in 0..i {
                edges.push((base + i, base + j));
            }
        }
    }
    let mut papers = papers_with(&edges, 10);
    for (i, p) in papers.iter_mut().enumerate() {
        p.index = i;
        p.included = true;
        p.connected = true;
        p.mass = 1.0;
        p.r = (1.0 / std::f64::consts::PI).sqrt();
        let clique_offset = if i < 5 { 0.0 } else { 12.0 };
        p.x = clique_offset + (i % 5) as f64 * 1.5;
        p.y = ((i * i) % 7) as f64 * 0.8;
    }
    let working: Vec<PaperId> = (0..10).collect();
    let mut layout = Layout::build_from_papers(&papers, &working, false, false);
    let params = ForceParams::default();
    let mut tree = QuadTree::new();
    for _ in 0..1500 {
        force::compute_forces(&params, false, &papers, &working, &mut layout, true, &mut tree);
        for n in &mut layout.nodes {
            n.fx /= n.mass;
            n.fy /= n.mass;
            let f = (n.fx * n.fx + n.fy * n.fy).sqrt();
            if f > 0.0 {
                let dt = 0.1 / f;
                n.x += dt * n.fx;
                n.y += dt * n.fy;
            }
        }
    }

    let d = |a: usize, b: usize| {
        let (na, nb) = (&layout.nodes[a], &layout.nodes[b]);
        ((na.x - nb.x).powi(2) + (na.y - nb.y).powi(2)).sqrt()
    };
    let mut intra = Vec::new();
    let mut inter_min = f64::MAX;
    for i in 0..10 {
        for j in 0..i {
            if (i < 5) == (j < 5) {
                intra.push(d(i, j));
            } else {
                inter_min = inter_min.min(d(i, j));
            }
        }
    }
    let intra_mean: f64 = intra.iter().sum::<f64>() / intra.len() as f64;
    assert!(
        intra_mean < inter_min,
        "intra mean {intra_mean} vs inter min {inter_min}"
    );
}

#[test]
fn citing_pair_ends_up_touching() {
    let mut env = env_with(&[(1, 0)], 2);
    refine_to_finest(&mut env);
    assert!(run(&mut env, 3000), "never converged");
    let p = &env.papers()[1];
    let r = &env.papers()[0];
    assert!(dist(p, r) < 2.0 * (p.r + r.r), "gap {}", dist(p, r));
}

#[test]
fn singleton_window_converges_immediately() {
    let mut env = MapEnv::with_seed(42);
    env.set_papers(papers_with(&[(1, 0), (2, 0)], 3), KeywordSet::new());
    let n = env.select_date_range(BASE_ID, BASE_ID, false);
    assert_eq!(n, 1);
    assert_eq!(env.num_papers(), 1);
    assert!(env.iterate(None, false));
    assert_eq!(env.energy(), 0.0);
}

#[test]
fn invalid_range_is_recovered() {
    let mut env = MapEnv::with_seed(42);
    env.set_papers(papers_with(&[(1, 0)], 2), KeywordSet::new());
    assert_eq!(env.select_date_range(BASE_ID + 10, BASE_ID, false), 0);
    assert_eq!(env.num_papers(), 0);
    assert!(env.iterate(None, false));
}

#[test]
fn id_range_reports_arena_bounds() {
    let mut env = MapEnv::with_seed(1);
    env.set_papers(papers_with(&[], 4), KeywordSet::new());
    assert_eq!(env.max_id_range(), (BASE_ID, BASE_ID + 3));
}

#[test]
fn category_centroids_follow_the_papers() {
    let mut env = env_with(&[(1, 0), (2, 0)], 3);
    refine_to_finest(&mut env);
    env.iterate(None, false);
    let info = env.category_info(Category::HepTh);
    assert_eq!(info.num, 3);
    // all papers share the category, so its centroid is the plain mean
    let mean_x: f64 = env.working_set().iter().map(|&p| env.papers()[p].x).sum::<f64>() / 3.0;
    assert!((info.x - mean_x).abs() < 1e-9);
    assert_eq!(env.category_info(Category::AstroPh).num, 0);
}
