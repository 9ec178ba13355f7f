//! Date-range conditioning: turn the raw paper arena plus a requested id
//! window into a simulation-ready working set.
//!
//! Selection marks the included papers, recomputes citation counts, masses
//! and connected components, keeps the largest component and stitches the
//! remaining islands back in through keyword-based fake links. Papers that
//! still cannot be reached are dropped with a warning.

use crate::category::Category;
use crate::paper::{KeywordSet, Paper, PaperId};
use crate::tred;
use petgraph::unionfind::UnionFind;
use rand::rngs::StdRng;
use rand::Rng;

/// Run the full conditioning pass and return the working set, in arena
/// order. Empty when the id range selects nothing.
pub(crate) fn select(
    papers: &mut [Paper],
    keywords: &mut KeywordSet,
    id_start: u32,
    id_end: u32,
    do_tred: bool,
    rng: &mut StdRng,
) -> Vec<PaperId> {
    let mut any_included = false;
    for p in papers.iter_mut() {
        p.included = p.id >= id_start && p.id <= id_end;
        p.fake_links.clear();
        any_included |= p.included;
    }

    if !any_included {
        tracing::info!(id_start, id_end, "no papers in id range");
        return Vec::new();
    }

    let id_span = id_end.saturating_sub(id_start);
    for p in papers.iter_mut() {
        if p.included {
            p.age = if id_span == 0 {
                0.0
            } else {
                f64::from(p.id - id_start) / f64::from(id_span)
            };
        }
    }

    recompute_included_cites(papers);
    recompute_colours(papers);

    if do_tred {
        tred::compute(papers);
    }

    // mass and radius from the included citation count; seed a start
    // position for papers entering the window
    for i in 0..papers.len() {
        papers[i].mass = 0.2 + 0.2 * f64::from(papers[i].num_included_cites);
        papers[i].r = (papers[i].mass / std::f64::consts::PI).sqrt();
        if papers[i].included {
            if !papers[i].pos_valid {
                seed_start_position(papers, i, rng);
                papers[i].pos_valid = true;
            }
        } else {
            papers[i].pos_valid = false;
        }
    }

    // the largest component wins; everything else starts disconnected
    let mut biggest_colour = 0;
    let mut biggest_count = 0;
    for p in papers.iter() {
        if p.included && p.num_with_my_colour > biggest_count {
            biggest_colour = p.colour;
            biggest_count = p.num_with_my_colour;
        }
    }

    let mut working = Vec::new();
    for (i, p) in papers.iter_mut().enumerate() {
        if p.included {
            p.connected = p.colour == biggest_colour;
            working.push(i);
        }
    }

    tracing::info!(
        total = working.len(),
        in_largest_component = biggest_count,
        "selected date range"
    );

    // stitch the islands onto the big graph, one category at a time
    let mut fake_papers = 0usize;
    let mut fake_links = 0usize;
    for cat in Category::ALL {
        keywords.clear_papers();
        for &pid in &working {
            let p = &papers[pid];
            if !p.connected || p.allcats[0] != cat {
                continue;
            }
            for &k in &p.keywords {
                let best = keywords.get(k).and_then(|kw| kw.paper);
                let heavier = best.map_or(true, |b| p.mass > papers[b].mass);
                if heavier {
                    if let Some(kw) = keywords.get_mut(k) {
                        kw.paper = Some(pid);
                    }
                }
            }
        }

        for wi in 0..working.len() {
            let pid = working[wi];
            if papers[pid].connected || papers[pid].allcats[0] != cat {
                continue;
            }
            make_fake_links(papers, &working, keywords, pid, cat);
            if !papers[pid].fake_links.is_empty() {
                fake_papers += 1;
                fake_links += papers[pid].fake_links.len();
                propagate_connectivity(papers, pid);
            }
        }
    }

    tracing::info!(fake_papers, fake_links, "stitched disconnected papers");

    // whatever is still unreachable gets dropped
    let mut dropped = 0usize;
    working.retain(|&pid| {
        let p = &papers[pid];
        if p.connected {
            return true;
        }
        let kw_list: Vec<&str> = p
            .keywords
            .iter()
            .filter_map(|&k| keywords.get(k).map(|kw| kw.text.as_str()))
            .collect();
        tracing::warn!(
            id = p.id,
            category = p.allcats[0].label(),
            keywords = ?kw_list,
            "could not connect paper with fake links"
        );
        dropped += 1;
        false
    });
    if dropped > 0 {
        tracing::info!(dropped, "papers remained disconnected");
    }

    working
}

/// One pass over the arena counting, for every paper, how many of its
/// citers are included.
pub(crate) fn recompute_included_cites(papers: &mut [Paper]) {
    for p in papers.iter_mut() {
        p.num_included_cites = 0;
    }
    for i in 0..papers.len() {
        if !papers[i].included {
            continue;
        }
        for j in 0..papers[i].refs.len() {
            let r = papers[i].refs[j];
            papers[r].num_included_cites += 1;
        }
    }
}

/// Connected components over the bidirectional closure of reference edges
/// among included papers. Each paper's colour is the smallest arena index
/// in its component; num_with_my_colour is the component size.
pub(crate) fn recompute_colours(papers: &mut [Paper]) {
    let n = papers.len();
    let mut uf = UnionFind::<usize>::new(n);
    for i in 0..n {
        if !papers[i].included {
            continue;
        }
        for j in 0..papers[i].refs.len() {
            let r = papers[i].refs[j];
            if papers[r].included {
                uf.union(i, r);
            }
        }
    }

    // ascending scan: the first index seen for a representative is the
    // component minimum
    let mut colour_of_rep = vec![usize::MAX; n];
    let mut count_of_colour = vec![0u32; n];
    for i in 0..n {
        if !papers[i].included {
            continue;
        }
        let rep = uf.find(i);
        if colour_of_rep[rep] == usize::MAX {
            colour_of_rep[rep] = i;
        }
        let colour = colour_of_rep[rep];
        papers[i].colour = colour;
        count_of_colour[colour] += 1;
    }
    for i in 0..n {
        if papers[i].included {
            papers[i].num_with_my_colour = count_of_colour[papers[i].colour];
        }
    }
}

/// Seed a position for a paper newly entering the window: the average of
/// its included references plus a little jitter, or uniform in [-50, 50]²
/// when it has none.
fn seed_start_position(papers: &mut [Paper], i: usize, rng: &mut StdRng) {
    let mut x = 0.0;
    let mut y = 0.0;
    let mut n = 0;
    for &r in &papers[i].refs {
        if papers[r].included {
            x += papers[r].x;
            y += papers[r].y;
            n += 1;
        }
    }
    if n == 0 {
        papers[i].x = 100.0 * (rng.gen::<f64>() - 0.5);
        papers[i].y = 100.0 * (rng.gen::<f64>() - 0.5);
    } else {
        // the jitter keeps single-reference papers off their parent's spot
        papers[i].x = x / f64::from(n) + (rng.gen::<f64>() - 0.5);
        papers[i].y = y / f64::from(n) + (rng.gen::<f64>() - 0.5);
    }
}

/// Fake links for one disconnected paper: the keyword-best papers of its
/// own keywords, falling back to the heaviest connected paper of its main
/// category (insertion order wins ties).
fn make_fake_links(
    papers: &mut [Paper],
    working: &[PaperId],
    keywords: &KeywordSet,
    pid: PaperId,
    want_cat: Category,
) {
    let mut links = Vec::new();
    for &k in &papers[pid].keywords {
        if let Some(best) = keywords.get(k).and_then(|kw| kw.paper) {
            links.push(best);
        }
    }

    if links.is_empty() {
        let mut found: Option<PaperId> = None;
        for &other in working {
            let p2 = &papers[other];
            if p2.included && p2.connected && p2.allcats[0] == want_cat {
                if found.map_or(true, |f| p2.mass > papers[f].mass) {
                    found = Some(other);
                }
            }
        }
        if let Some(f) = found {
            links.push(f);
        }
    }

    papers[pid].fake_links = links;
}

/// Mark a freshly stitched paper and everything reachable from it through
/// references and citations as connected. Explicit work stack.
fn propagate_connectivity(papers: &mut [Paper], start: PaperId) {
    let mut stack = vec![start];
    while let Some(cur) = stack.pop() {
        if papers[cur].connected || !papers[cur].included {
            continue;
        }
        papers[cur].connected = true;
        for j in 0..papers[cur].refs.len() {
            stack.push(papers[cur].refs[j]);
        }
        for j in 0..papers[cur].cites.len() {
            stack.push(papers[cur].cites[j]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn arena(edges: &[(usize, usize)], n: usize) -> Vec<Paper> {
        let mut papers: Vec<Paper> = (0..n)
            .map(|i| {
                let mut p = Paper::new(100 + i as u32, Category::HepTh, format!("p{i}"));
                p.index = i;
                p
            })
            .collect();
        for &(src, dst) in edges {
            papers[src].refs.push(dst);
            papers[dst].cites.push(src);
        }
        papers
    }

    #[test]
    fn empty_range_selects_nothing() {
        let mut papers = arena(&[(1, 0)], 2);
        let mut kws = KeywordSet::new();
        let working = select(&mut papers, &mut kws, 1, 2, false, &mut rng());
        assert!(working.is_empty());
        assert!(!papers[0].included);
    }

    #[test]
    fn ages_span_zero_to_one() {
        let mut papers = arena(&[(1, 0), (2, 1)], 3);
        let mut kws = KeywordSet::new();
        select(&mut papers, &mut kws, 100, 102, false, &mut rng());
        assert_eq!(papers[0].age, 0.0);
        assert_eq!(papers[1].age, 0.5);
        assert_eq!(papers[2].age, 1.0);
    }

    #[test]
    fn colours_identify_components() {
        // two components: {0, 1} and {2, 3, 4}
        let mut papers = arena(&[(1, 0), (3, 2), (4, 3)], 5);
        for p in papers.iter_mut() {
            p.included = true;
        }
        recompute_colours(&mut papers);
        assert_eq!(papers[0].colour, papers[1].colour);
        assert_eq!(papers[2].colour, papers[3].colour);
        assert_ne!(papers[0].colour, papers[2].colour);
        assert_eq!(papers[0].num_with_my_colour, 2);
        assert_eq!(papers[4].num_with_my_colour, 3);
        // colour is the smallest member index
        assert_eq!(papers[1].colour, 0);
        assert_eq!(papers[4].colour, 2);
    }

    #[test]
    fn included_cites_count_only_included_citers() {
        let mut papers = arena(&[(1, 0), (2, 0)], 3);
        papers[0].included = true;
        papers[1].included = true;
        papers[2].included = false;
        recompute_included_cites(&mut papers);
        assert_eq!(papers[0].num_included_cites, 1);
    }

    #[test]
    fn keyword_stitching_connects_island() {
        // {0,1,2} form the big component; 3 is an island sharing a keyword
        let mut kws = KeywordSet::new();
        let shared = kws.intern("lattice");
        let mut papers = arena(&[(1, 0), (2, 0)], 4);
        papers[1].keywords.push(shared);
        papers[3].keywords.push(shared);
        let working = select(&mut papers, &mut kws, 100, 103, false, &mut rng());
        assert_eq!(working.len(), 4);
        assert!(papers[3].connected);
        assert_eq!(papers[3].fake_links, vec![1]);
    }

    #[test]
    fn category_fallback_targets_heaviest_connected() {
        // island paper 3 has no keywords; 0 is the heaviest connected paper
        // of the shared category
        let mut kws = KeywordSet::new();
        let mut papers = arena(&[(1, 0), (2, 0)], 4);
        let working = select(&mut papers, &mut kws, 100, 103, false, &mut rng());
        assert_eq!(working.len(), 4);
        // 0 is cited twice, so it is the heaviest
        assert_eq!(papers[3].fake_links, vec![0]);
        assert!(papers[3].connected);
    }

    #[test]
    fn unreachable_island_is_dropped() {
        // island of a different category with no keywords: nothing to
        // stitch to, so it falls out of the working set
        let mut kws = KeywordSet::new();
        let mut papers = arena(&[(1, 0), (2, 0)], 4);
        papers[3].allcats[0] = Category::AstroPh;
        let working = select(&mut papers, &mut kws, 100, 103, false, &mut rng());
        assert_eq!(working, vec![0, 1, 2]);
        assert!(!papers[3].connected);
    }

    #[test]
    fn stitching_propagates_through_island_edges() {
        // 3 <- 4 form a two-paper island; stitching 3 must also connect 4
        let mut kws = KeywordSet::new();
        let shared = kws.intern("defects");
        let mut papers = arena(&[(1, 0), (2, 0), (4, 3)], 5);
        papers[0].keywords.push(shared);
        papers[3].keywords.push(shared);
        let working = select(&mut papers, &mut kws, 100, 104, false, &mut rng());
        assert_eq!(working.len(), 5);
        assert!(papers[3].connected);
        assert!(papers[4].connected);
    }

    #[test]
    fn mass_follows_included_citations() {
        let mut papers = arena(&[(1, 0), (2, 0)], 3);
        let mut kws = KeywordSet::new();
        select(&mut papers, &mut kws, 100, 102, false, &mut rng());
        assert!((papers[0].mass - 0.6).abs() < 1e-12);
        assert!((papers[1].mass - 0.2).abs() < 1e-12);
        assert!((papers[0].r - (0.6 / std::f64::consts::PI).sqrt()).abs() < 1e-12);
    }
}
