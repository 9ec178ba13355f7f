//! Paper and keyword data model.
//!
//! Papers live in a single arena (`Vec<Paper>`) owned by the engine for the
//! whole session; all cross-references between papers, keywords and layout
//! nodes are plain indices into their owning arenas, so the citation cycles
//! (P cites R, R is cited by P) need no shared ownership.

use crate::category::Category;
use chrono::NaiveDate;

/// Index of a paper in the arena
pub type PaperId = usize;

/// Index of a keyword in the keyword set
pub type KeywordId = usize;

/// Maximum categories per paper (main + extras, `Unknown`-terminated)
pub const PAPER_MAX_CATS: usize = 4;

/// Bits of a paper id reserved for the per-day sequence number
const ID_SEQ_BITS: u32 = 10;

/// Build a paper id from a calendar date and a per-day sequence number.
///
/// The day count occupies the high bits, so ids sort by date; up to 1024
/// papers share one day.
pub fn date_to_id(date: NaiveDate, seq: u16) -> u32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    let days = date.signed_duration_since(epoch).num_days().max(0) as u32;
    (days << ID_SEQ_BITS) | u32::from(seq & 0x3ff)
}

/// Recover the calendar date encoded in a paper id.
pub fn id_to_date(id: u32) -> Option<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    epoch.checked_add_signed(chrono::Duration::days(i64::from(id >> ID_SEQ_BITS)))
}

/// A paper: immutable identity plus the mutable state the simulation works on
#[derive(Debug, Clone)]
pub struct Paper {
    // Identity (filled by the loader, never changed by the engine)
    /// Date-ordered unique id (see [`date_to_id`])
    pub id: u32,
    /// Main category first, then extras, `Unknown`-terminated
    pub allcats: [Category; PAPER_MAX_CATS],
    /// Papers this paper cites (arena indices)
    pub refs: Vec<PaperId>,
    /// Papers citing this paper; derived from `refs` by `MapEnv::set_papers`
    pub cites: Vec<PaperId>,
    /// Keywords attached to this paper
    pub keywords: Vec<KeywordId>,
    pub title: String,

    // Simulation state
    /// Position in the arena; ascending index implies ascending id
    pub index: usize,
    /// World coordinates
    pub x: f64,
    pub y: f64,
    /// Disc radius, √(mass/π)
    pub r: f64,
    pub mass: f64,
    /// Inside the active date window
    pub included: bool,
    /// Reachable from the largest component (directly or via fake links)
    pub connected: bool,
    /// Whether (x, y) carries over from the previous window
    pub pos_valid: bool,
    /// Normalized position in the date window, 0 = oldest, 1 = newest
    pub age: f64,
    /// Citation count restricted to included papers
    pub num_included_cites: u32,
    /// Component tag: smallest arena index in this paper's component
    pub colour: usize,
    /// Size of this paper's component
    pub num_with_my_colour: u32,
    /// Synthesized edges stitching this paper to the connected graph
    pub fake_links: Vec<PaperId>,
    /// Per-reference weight after transitive reduction; 0 = eliminated
    pub refs_tred_computed: Vec<u32>,
    /// Scratch marker for the reduction DFS
    pub tred_visit_index: usize,
    /// This paper's level-0 layout node, when in the working set
    pub layout_node: Option<usize>,
}

impl Paper {
    pub fn new(id: u32, main_cat: Category, title: impl Into<String>) -> Self {
        let mut allcats = [Category::Unknown; PAPER_MAX_CATS];
        allcats[0] = main_cat;
        Self {
            id,
            allcats,
            refs: Vec::new(),
            cites: Vec::new(),
            keywords: Vec::new(),
            title: title.into(),
            index: 0,
            x: 0.0,
            y: 0.0,
            r: 0.0,
            mass: 0.0,
            included: false,
            connected: false,
            pos_valid: false,
            age: 0.0,
            num_included_cites: 0,
            colour: 0,
            num_with_my_colour: 0,
            fake_links: Vec::new(),
            refs_tred_computed: Vec::new(),
            tred_visit_index: usize::MAX,
            layout_node: None,
        }
    }

    pub fn with_refs(mut self, refs: Vec<PaperId>) -> Self {
        self.refs = refs;
        self
    }

    pub fn with_keywords(mut self, keywords: Vec<KeywordId>) -> Self {
        self.keywords = keywords;
        self
    }

    /// Secondary categories actually set (stops at the `Unknown` terminator)
    pub fn cats(&self) -> impl Iterator<Item = Category> + '_ {
        self.allcats
            .iter()
            .copied()
            .take_while(|c| *c != Category::Unknown)
    }
}

/// A keyword shared across papers
#[derive(Debug, Clone)]
pub struct Keyword {
    pub text: String,
    /// Heaviest connected paper carrying this keyword in the category
    /// currently being stitched; transient, reset between passes
    pub paper: Option<PaperId>,
}

/// Owning store for keywords, shared by reference with the engine
#[derive(Debug, Default)]
pub struct KeywordSet {
    keywords: Vec<Keyword>,
    by_text: std::collections::HashMap<String, KeywordId>,
}

impl KeywordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the keyword with the given text
    pub fn intern(&mut self, text: &str) -> KeywordId {
        if let Some(&id) = self.by_text.get(text) {
            return id;
        }
        let id = self.keywords.len();
        self.keywords.push(Keyword {
            text: text.to_string(),
            paper: None,
        });
        self.by_text.insert(text.to_string(), id);
        id
    }

    pub fn get(&self, id: KeywordId) -> Option<&Keyword> {
        self.keywords.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: KeywordId) -> Option<&mut Keyword> {
        self.keywords.get_mut(id)
    }

    /// Reset the transient best-paper field on every keyword
    pub(crate) fn clear_papers(&mut self) {
        for kw in &mut self.keywords {
            kw.paper = None;
        }
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}
