use std::collections::HashSet;
use std::io::Read;
use std::sync::OnceLock;

use gitbatch_protocol::ListingEntry;
use gitbatch_types::{EntryMode, ObjectId};
use tracing::{debug, trace};

use crate::blob::Blob;
use crate::error::{BadLinkReason, ObjectError, ObjectResult};
use crate::tree::Tree;

/// A named edge in a tree.
#[derive(Clone, Debug)]
pub struct TreeEntry {
    id: ObjectId,
    name: String,
    mode: EntryMode,
    size: OnceLock<u64>,
    parent: Tree,
}

impl TreeEntry {
    pub(crate) fn new(
        parent: Tree,
        id: ObjectId,
        name: String,
        mode: EntryMode,
        size: Option<u64>,
    ) -> Self {
        let entry = Self {
            id,
            name,
            mode,
            size: OnceLock::new(),
            parent,
        };
        if let Some(size) = size {
            let _ = entry.size.set(size);
        }
        entry
    }

    pub(crate) fn from_listing(parent: &Tree, listing: &ListingEntry) -> Self {
        Self::new(
            parent.clone(),
            listing.id,
            listing.name.clone(),
            listing.mode,
            listing.size,
        )
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> EntryMode {
        self.mode
    }

    /// The tree this entry was listed in.
    pub fn parent_tree(&self) -> &Tree {
        &self.parent
    }

    pub fn is_dir(&self) -> bool {
        self.mode == EntryMode::Tree
    }

    pub fn is_link(&self) -> bool {
        self.mode == EntryMode::Symlink
    }

    pub fn is_regular(&self) -> bool {
        self.mode == EntryMode::Blob
    }

    pub fn is_executable(&self) -> bool {
        self.mode == EntryMode::Exec
    }

    pub fn is_submodule(&self) -> bool {
        self.mode == EntryMode::Commit
    }

    /// `"commit"`, `"tree"`, or `"blob"`.
    pub fn kind_name(&self) -> &'static str {
        match self.mode {
            EntryMode::Commit => "commit",
            EntryMode::Tree => "tree",
            _ => "blob",
        }
    }

    pub fn try_size(&self) -> ObjectResult<u64> {
        if self.is_dir() {
            return Ok(0);
        }
        if let Some(size) = self.size.get() {
            return Ok(*size);
        }
        let size = self.parent.repository().object_size(&self.id)?;
        Ok(*self.size.get_or_init(|| size))
    }

    /// Size of the entry's object; 0 for directories and for failed lookups.
    pub fn size(&self) -> u64 {
        match self.try_size() {
            Ok(size) => size,
            Err(e) => {
                debug!(id = %self.id, name = %self.name, error = %e, "size lookup failed; reporting 0");
                0
            }
        }
    }

    pub fn blob(&self) -> Blob {
        Blob::with_size(
            self.parent.repository().clone(),
            self.id,
            self.name.clone(),
            self.size.get().copied(),
        )
    }

    /// The subtree a directory entry points at, parented to this entry's tree.
    pub fn tree(&self) -> ObjectResult<Tree> {
        let repo = self.parent.repository();
        let (id, entries) = repo.read_tree(self.id)?;
        Ok(Tree::new(repo.clone(), id, Some(self.parent.clone()), entries))
    }

    /// Path through chains of directories that each hold only one directory,
    /// e.g. `src/main/java`. Empty for non-directories.
    pub fn sub_jumpable_path_name(&self) -> String {
        if self.is_submodule() || !self.is_dir() {
            return String::new();
        }
        let Ok(tree) = self.parent.sub_tree(&self.name) else {
            return self.name.clone();
        };
        let entries = tree.list_entries();
        if let [only] = entries.as_slice() {
            if only.is_dir() {
                let rest = only.sub_jumpable_path_name();
                if !rest.is_empty() {
                    return format!("{}/{}", self.name, rest);
                }
            }
        }
        self.name.clone()
    }

    // -----------------------------------------------------------------------
    // Symlinks
    // -----------------------------------------------------------------------

    /// The raw target text of a symlink entry.
    pub fn link_target(&self) -> ObjectResult<String> {
        if !self.is_link() {
            return Err(ObjectError::bad_link(&self.name, BadLinkReason::NotSymlink));
        }
        let limit = self.parent.repository().config().symlink_size_limit;
        let blob = self.blob();
        if blob.size() > limit {
            return Err(ObjectError::bad_link(&self.name, BadLinkReason::TooLarge));
        }

        let (mut rd, size) = blob.new_truncated_reader(limit)?;
        let mut buf = Vec::with_capacity(size.min(limit) as usize);
        let read = rd.read_to_end(&mut buf);
        let closed = rd.close();
        read?;
        closed?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Resolve one level of symlink relative to the entry's tree. Returns the
    /// target entry and the path it was found at, relative to the tree the
    /// leading `../` segments climbed to.
    pub fn follow_link(&self) -> ObjectResult<(TreeEntry, String)> {
        let target = self.link_target()?;

        let mut link = target.as_str();
        let mut tree = Some(&self.parent);
        while let (Some(t), Some(rest)) = (tree, link.strip_prefix("../")) {
            tree = t.parent();
            link = rest;
        }
        let Some(tree) = tree else {
            return Err(ObjectError::bad_link(&self.name, BadLinkReason::OutsideRepo));
        };

        match tree.get_tree_entry_by_path(link) {
            Ok(entry) => Ok((entry, link.to_string())),
            Err(e) if e.is_not_exist() => {
                Err(ObjectError::bad_link(&self.name, BadLinkReason::Broken))
            }
            Err(e) => Err(e),
        }
    }

    /// Follow a chain of symlinks to the first entry that is not one.
    ///
    /// Revisiting an entry already on the chain is reported as a recursive
    /// link; a chain longer than the configured hop limit is refused.
    pub fn follow_links(&self) -> ObjectResult<(TreeEntry, String)> {
        if !self.is_link() {
            return Err(ObjectError::bad_link(&self.name, BadLinkReason::NotSymlink));
        }
        let max_hops = self.parent.repository().config().max_symlink_hops;

        let mut visited = HashSet::from([self.location()]);
        let mut entry = self.clone();
        let mut entry_link = String::new();
        for _ in 0..max_hops {
            if !entry.is_link() {
                break;
            }
            let (next, link) = entry.follow_link()?;
            if !visited.insert(next.location()) {
                return Err(ObjectError::bad_link(&entry.name, BadLinkReason::Recursive));
            }
            trace!(from = %entry.name, to = %link, "followed symlink");
            entry = next;
            entry_link = link;
        }
        if entry.is_link() {
            return Err(ObjectError::bad_link(&self.name, BadLinkReason::TooManyLevels));
        }
        Ok((entry, entry_link))
    }

    /// Where this entry sits: its name plus the ids of every tree above it.
    /// Two entries with the same location resolve links identically.
    fn location(&self) -> (Vec<ObjectId>, String) {
        let mut ancestors = Vec::new();
        let mut tree = Some(&self.parent);
        while let Some(t) = tree {
            ancestors.push(t.id());
            tree = t.parent();
        }
        (ancestors, self.name.clone())
    }
}
