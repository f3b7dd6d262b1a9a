use std::fmt;
use std::sync::Arc;

use gitbatch_protocol::{parse_ls_tree, ListingEntry};
use gitbatch_types::{EntryMode, ObjectId};

use crate::blob::Blob;
use crate::entries::Entries;
use crate::entry::TreeEntry;
use crate::error::{ObjectError, ObjectResult};
use crate::repository::Repository;

/// A loaded tree object.
///
/// Cheap to clone. A tree reached through a path or a directory entry knows
/// the tree it was reached from, which is what lets relative symlinks walk
/// up with `../`.
#[derive(Clone)]
pub struct Tree {
    inner: Arc<TreeInner>,
}

struct TreeInner {
    id: ObjectId,
    repo: Repository,
    parent: Option<Tree>,
    entries: Vec<ListingEntry>,
}

impl Tree {
    pub(crate) fn new(
        repo: Repository,
        id: ObjectId,
        parent: Option<Tree>,
        entries: Vec<ListingEntry>,
    ) -> Self {
        Self {
            inner: Arc::new(TreeInner {
                id,
                repo,
                parent,
                entries,
            }),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    pub fn repository(&self) -> &Repository {
        &self.inner.repo
    }

    /// The tree this one was reached from; `None` for a tree loaded directly.
    pub fn parent(&self) -> Option<&Tree> {
        self.inner.parent.as_ref()
    }

    /// Entries in the order the tree object stores them.
    pub fn list_entries(&self) -> Entries {
        self.inner
            .entries
            .iter()
            .map(|e| TreeEntry::from_listing(self, e))
            .collect()
    }

    /// Bind captured `ls-tree` output to this tree. Sizes from `ls-tree -l`
    /// are kept so the entries never ask the backend for them.
    pub fn entries_from_listing(&self, data: &[u8]) -> ObjectResult<Entries> {
        let listing = parse_ls_tree(data)?;
        Ok(listing
            .iter()
            .map(|e| TreeEntry::from_listing(self, e))
            .collect())
    }

    /// Walk down `rpath` one directory at a time. The empty path is this tree.
    pub fn sub_tree(&self, rpath: &str) -> ObjectResult<Tree> {
        if rpath.is_empty() {
            return Ok(self.clone());
        }
        let mut current = self.clone();
        for name in rpath.split('/') {
            let entry = current.get_tree_entry_by_path(name)?;
            if !entry.is_dir() {
                return Err(ObjectError::not_exist_path(rpath));
            }
            current = entry.tree()?;
        }
        Ok(current)
    }

    /// Look up the entry at `relpath`. The empty path yields an entry for this
    /// tree itself.
    pub fn get_tree_entry_by_path(&self, relpath: &str) -> ObjectResult<TreeEntry> {
        if relpath.is_empty() {
            return Ok(TreeEntry::new(
                self.clone(),
                self.id(),
                String::new(),
                EntryMode::Tree,
                None,
            ));
        }

        let cleaned = clean_path(relpath);
        let (tree, name) = match cleaned.rsplit_once('/') {
            Some((dir, name)) => (self.sub_tree(dir)?, name),
            None => (self.clone(), cleaned.as_str()),
        };
        tree.inner
            .entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| TreeEntry::from_listing(&tree, e))
            .ok_or_else(|| ObjectError::not_exist_path(relpath))
    }

    /// The blob at `relpath`. Directories and submodules do not count.
    pub fn get_blob_by_path(&self, relpath: &str) -> ObjectResult<Blob> {
        let entry = self.get_tree_entry_by_path(relpath)?;
        if entry.is_dir() || entry.is_submodule() {
            return Err(ObjectError::not_exist_path(relpath));
        }
        Ok(entry.blob())
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("id", &self.inner.id)
            .field("parent", &self.parent().map(Tree::id))
            .field("entries", &self.inner.entries.len())
            .finish()
    }
}

/// Lexically normalise a slash-separated path: collapse repeated slashes,
/// drop `.` segments, and resolve `..` against earlier segments.
fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}
