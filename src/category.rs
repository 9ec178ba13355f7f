//! Paper category enumeration.
//!
//! A closed set of subject tags with an `Unknown` sentinel. Each paper
//! carries a main category plus up to `PAPER_MAX_CATS - 1` extras; the
//! conditioner groups fake-link stitching by main category.

use serde::{Deserialize, Serialize};

/// Subject category of a paper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    HepTh,
    HepPh,
    HepEx,
    HepLat,
    GrQc,
    AstroPh,
    CondMat,
    QuantPh,
    MathPh,
    NuclTh,
    #[default]
    Unknown,
}

impl Category {
    /// Every category, `Unknown` last (its slot terminates a paper's
    /// category list)
    pub const ALL: [Category; 11] = [
        Category::HepTh,
        Category::HepPh,
        Category::HepEx,
        Category::HepLat,
        Category::GrQc,
        Category::AstroPh,
        Category::CondMat,
        Category::QuantPh,
        Category::MathPh,
        Category::NuclTh,
        Category::Unknown,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::HepTh => "hep-th",
            Category::HepPh => "hep-ph",
            Category::HepEx => "hep-ex",
            Category::HepLat => "hep-lat",
            Category::GrQc => "gr-qc",
            Category::AstroPh => "astro-ph",
            Category::CondMat => "cond-mat",
            Category::QuantPh => "quant-ph",
            Category::MathPh => "math-ph",
            Category::NuclTh => "nucl-th",
            Category::Unknown => "unknown",
        }
    }

    /// Stable index for per-category tables
    pub fn index(&self) -> usize {
        *self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_match_all_table() {
        for (i, cat) in Category::ALL.iter().enumerate() {
            assert_eq!(cat.index(), i);
        }
    }

    #[test]
    fn unknown_is_last() {
        assert_eq!(Category::ALL[Category::ALL.len() - 1], Category::Unknown);
    }
}
