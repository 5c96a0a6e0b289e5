//! Approximate name matching against shortest-first candidate lists
//!
//! Candidates are kept sorted by length, then lexicographically. The first
//! candidate that fuzzily contains the query wins, which biases matches
//! toward base product names (`proxmox`) over derivatives sharing the same
//! prefix (`proxmox-backup-server`).

use std::cmp::Ordering;

use nucleo_matcher::pattern::{Atom, AtomKind, CaseMatching, Normalization};
use nucleo_matcher::{Config, Matcher, Utf32Str};

use crate::model::CatalogEntry;

/// Shortest first, then lexicographic
pub fn by_length_then_name(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

pub fn sort_names(names: &mut [String]) {
    names.sort_by(|a, b| by_length_then_name(a, b));
}

pub fn sort_entries<T: CatalogEntry>(entries: &mut [T]) {
    entries.sort_by(|a, b| by_length_then_name(a.reference(), b.reference()));
}

/// Case-insensitive fuzzy matcher returning the rank-0 candidate
pub struct FuzzyMatcher {
    matcher: Matcher,
    buf: Vec<char>,
}

impl FuzzyMatcher {
    pub fn new() -> Self {
        Self {
            matcher: Matcher::new(Config::DEFAULT),
            buf: Vec::new(),
        }
    }

    /// First candidate, in list order, that the query matches
    ///
    /// `candidates` must already be sorted with [`by_length_then_name`].
    pub fn best_match<'a, I>(&mut self, query: &str, candidates: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        if query.trim().is_empty() {
            return None;
        }
        let atom = Self::atom(query);
        candidates
            .into_iter()
            .find(|candidate| self.matches_atom(&atom, candidate))
    }

    fn atom(query: &str) -> Atom {
        Atom::new(
            query,
            CaseMatching::Ignore,
            Normalization::Smart,
            AtomKind::Fuzzy,
            false,
        )
    }

    fn matches_atom(&mut self, atom: &Atom, candidate: &str) -> bool {
        let haystack = Utf32Str::new(candidate, &mut self.buf);
        atom.score(haystack, &mut self.matcher).is_some()
    }
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new()
    }
}
