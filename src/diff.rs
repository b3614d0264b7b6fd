//! # Resource diff engine
//!
//! One algorithm for both manifest reloads and popup HTML edits: path-set
//! difference by exact string equality. `add` keeps the order of the new set,
//! `delete` the order of the old one.

use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub add: Vec<String>,
    pub delete: Vec<String>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.delete.is_empty()
    }
}

pub fn diff(old: &[String], new: &[String]) -> Diff {
    let old_set: HashSet<&str> = old.iter().map(String::as_str).collect();
    let new_set: HashSet<&str> = new.iter().map(String::as_str).collect();

    Diff {
        add: unique_not_in(new, &old_set),
        delete: unique_not_in(old, &new_set),
    }
}

/// With no previous set, everything is an addition.
pub fn diff_from(old: Option<&[String]>, new: &[String]) -> Diff {
    diff(old.unwrap_or(&[]), new)
}

fn unique_not_in(items: &[String], other: &HashSet<&str>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|p| !other.contains(p.as_str()) && seen.insert(p.as_str()))
        .cloned()
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTML-level resource sets
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolved resource keys of one HTML document, by category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSet {
    /// `<script src>`
    pub scripts: Vec<String>,
    /// `<link rel="stylesheet" href>`
    pub hrefs: Vec<String>,
    /// `<img|video|iframe src>`
    pub srcs: Vec<String>,
    /// any other `<link href>`
    pub links: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSetDiff {
    pub scripts: Diff,
    pub hrefs: Diff,
    pub srcs: Diff,
    pub links: Diff,
}

impl ResourceSetDiff {
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
            && self.hrefs.is_empty()
            && self.srcs.is_empty()
            && self.links.is_empty()
    }
}

impl ResourceSet {
    pub fn diff(old: Option<&ResourceSet>, new: &ResourceSet) -> ResourceSetDiff {
        let empty = ResourceSet::default();
        let old = old.unwrap_or(&empty);
        ResourceSetDiff {
            scripts: diff(&old.scripts, &new.scripts),
            hrefs: diff(&old.hrefs, &new.hrefs),
            srcs: diff(&old.srcs, &new.srcs),
            links: diff(&old.links, &new.links),
        }
    }
}
