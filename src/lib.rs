//! Force-directed layout engine for citation graphs.
//!
//! Papers cite prior papers; the engine conditions the citation graph to a
//! date window, then relaxes an N-body system over it: attractive springs
//! along citation edges, Barnes-Hut anti-gravity between nodes, optional
//! short-range repulsion that resolves disc overlap, all on top of a
//! multigrid coarsening hierarchy that converges large graphs quickly.
//! Transitive reduction optionally declutters the DAG beforehand.
//!
//! The driving loop is external: a renderer calls [`MapEnv::iterate`]
//! between paints and reads positions and statistics back out.

pub mod category;
pub mod env;
pub mod force;
pub mod layout;
pub mod paper;
pub mod tred;

mod conditioner;
mod quadtree;

#[cfg(test)]
mod sim_tests;

pub use category::Category;
pub use env::{CategoryInfo, MapEnv};
pub use force::ForceParams;
pub use paper::{date_to_id, id_to_date, Keyword, KeywordSet, Paper, PaperId};
