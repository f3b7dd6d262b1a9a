use std::cmp::Ordering;
use std::ops::{Deref, DerefMut};

use crate::entry::TreeEntry;

/// An ordered list of tree entries.
///
/// Order here is presentation only: the same tree may be listed in any order.
#[derive(Clone, Debug, Default)]
pub struct Entries(Vec<TreeEntry>);

/// "Does `a` come strictly before `b`?" under one criterion.
type SortRule = fn(&TreeEntry, &TreeEntry, &dyn Fn(&str, &str) -> Ordering) -> bool;

/// Applied in order; the first rule that separates two entries decides.
/// The last rule always decides.
const SORT_RULES: [SortRule; 2] = [containers_first, by_name];

fn is_container(e: &TreeEntry) -> bool {
    e.is_dir() || e.is_submodule()
}

fn containers_first(a: &TreeEntry, b: &TreeEntry, _: &dyn Fn(&str, &str) -> Ordering) -> bool {
    is_container(a) && !is_container(b)
}

fn by_name(a: &TreeEntry, b: &TreeEntry, cmp: &dyn Fn(&str, &str) -> Ordering) -> bool {
    cmp(a.name(), b.name()) == Ordering::Less
}

fn compare(a: &TreeEntry, b: &TreeEntry, cmp: &dyn Fn(&str, &str) -> Ordering) -> Ordering {
    let (last, rules) = (SORT_RULES[SORT_RULES.len() - 1], &SORT_RULES[..SORT_RULES.len() - 1]);
    for rule in rules {
        if rule(a, b, cmp) {
            return Ordering::Less;
        }
        if rule(b, a, cmp) {
            return Ordering::Greater;
        }
    }
    if last(a, b, cmp) {
        Ordering::Less
    } else if last(b, a, cmp) {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

impl Entries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directories and submodules first, then by byte-wise name.
    pub fn sort(&mut self) {
        self.custom_sort(|a, b| a.cmp(b));
    }

    /// Directories and submodules first, then by `cmp` on names. Stable.
    pub fn custom_sort<F>(&mut self, cmp: F)
    where
        F: Fn(&str, &str) -> Ordering,
    {
        self.0.sort_by(|a, b| compare(a, b, &cmp));
    }

    pub fn into_vec(self) -> Vec<TreeEntry> {
        self.0
    }
}

impl Deref for Entries {
    type Target = Vec<TreeEntry>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Entries {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<TreeEntry>> for Entries {
    fn from(entries: Vec<TreeEntry>) -> Self {
        Self(entries)
    }
}

impl FromIterator<TreeEntry> for Entries {
    fn from_iter<I: IntoIterator<Item = TreeEntry>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Entries {
    type Item = TreeEntry;
    type IntoIter = std::vec::IntoIter<TreeEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Entries {
    type Item = &'a TreeEntry;
    type IntoIter = std::slice::Iter<'a, TreeEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
