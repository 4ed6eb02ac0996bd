//! Immutable tag snapshots.
//!
//! A [`RepositoryTagMap`] is persisted as a commit whose tree holds:
//!
//! - `tags`: a blob listing `name\nentry-hex\n` pairs in name order
//! - `entry-<hex>`: each tag entry blob
//! - `root-<hex>`: each tag's content root
//!
//! so the commit transitively references every object a tag points at and
//! validating the commit validates the whole snapshot. The commit carries a
//! `sequence` attribute one greater than its parent's.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use depot_store::{Commit, EntryMode, ObjectStore, Tree, TreeEntry};
use depot_types::{ObjectId, TagPath};

use crate::entry::{Metadata, RepositoryTagEntry, MESSAGE_KEY};
use crate::error::{RepositoryError, RepositoryResult};

/// Name of the index blob inside a snapshot tree.
pub const TAGS_ENTRY: &str = "tags";
/// Commit attribute holding the snapshot sequence number.
pub const SEQUENCE_KEY: &str = "sequence";

const ENTRY_PREFIX: &str = "entry-";
const ROOT_PREFIX: &str = "root-";

/// One version of the tag set. Never mutated once built.
#[derive(Clone, Debug, Default)]
pub struct RepositoryTagMap {
    commit: Option<ObjectId>,
    parent: Option<ObjectId>,
    sequence: u64,
    tags: BTreeMap<TagPath, RepositoryTagEntry>,
    // Tree modes of content roots, so derivation needs no kind lookups for
    // tags carried over unchanged.
    root_modes: HashMap<ObjectId, EntryMode>,
}

impl RepositoryTagMap {
    /// The initial snapshot: no commit, sequence 0, no tags.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the snapshot recorded by `commit_id`.
    pub fn load(store: &dyn ObjectStore, commit_id: &ObjectId) -> RepositoryResult<Self> {
        let corrupt = |reason: String| RepositoryError::CorruptSnapshot {
            id: *commit_id,
            reason,
        };

        let commit = store.read_commit(commit_id)?;
        let sequence = commit
            .attribute(SEQUENCE_KEY)
            .ok_or_else(|| corrupt("snapshot commit has no sequence".into()))?
            .parse::<u64>()
            .map_err(|e| corrupt(format!("bad sequence: {e}")))?;

        let tree = store.read_tree(&commit.tree)?;
        let index = tree
            .get(TAGS_ENTRY)
            .ok_or_else(|| corrupt("snapshot tree has no tags index".into()))?;
        let index = store.read_blob(&index.object_id)?;
        let index = String::from_utf8(index).map_err(|e| corrupt(format!("tags index: {e}")))?;

        let mut lines = index.lines();
        let mut tags = BTreeMap::new();
        while let Some(name) = lines.next() {
            let entry_hex = lines
                .next()
                .ok_or_else(|| corrupt(format!("tags index: {name:?} has no entry")))?;
            let name = TagPath::parse(name).map_err(|e| corrupt(e.to_string()))?;
            let entry_id = ObjectId::from_hex(entry_hex).map_err(|e| corrupt(e.to_string()))?;
            let entry = RepositoryTagEntry::load(store, &entry_id)?;
            if entry.name() != &name {
                return Err(corrupt(format!(
                    "index name {name} does not match entry name {}",
                    entry.name()
                )));
            }
            tags.insert(name, entry);
        }

        let root_modes = tree
            .iter()
            .filter(|e| e.name.starts_with(ROOT_PREFIX))
            .map(|e| (e.object_id, e.mode))
            .collect();

        debug!(
            commit = %commit_id.short_hex(),
            sequence,
            tags = tags.len(),
            "loaded tag snapshot"
        );
        Ok(Self {
            commit: Some(*commit_id),
            parent: commit.parent,
            sequence,
            tags,
            root_modes,
        })
    }

    /// Persist `tags` as the successor of `parent`.
    ///
    /// Every content root must already be stored.
    pub fn derive(
        store: &dyn ObjectStore,
        parent: &RepositoryTagMap,
        tags: BTreeMap<TagPath, RepositoryTagEntry>,
        message: &str,
        metadata: &Metadata,
    ) -> RepositoryResult<Self> {
        let mut index = String::new();
        let mut entries = Vec::with_capacity(tags.len() * 2 + 1);
        let mut root_modes = HashMap::with_capacity(tags.len());

        for (name, entry) in &tags {
            index.push_str(&name.as_string());
            index.push('\n');
            index.push_str(&entry.id().to_hex());
            index.push('\n');

            let content = entry.content_id();
            let mode = match parent.root_modes.get(&content) {
                Some(mode) => *mode,
                None => {
                    let kind = store.kind(&content)?.ok_or(RepositoryError::Validation {
                        id: content,
                        missing: content,
                    })?;
                    EntryMode::for_kind(kind)
                }
            };
            root_modes.insert(content, mode);
            entries.push(TreeEntry::new(
                EntryMode::Regular,
                format!("{ENTRY_PREFIX}{}", entry.id()),
                entry.id(),
            ));
            entries.push(TreeEntry::new(mode, format!("{ROOT_PREFIX}{content}"), content));
        }

        let index_id = store.add_blob(index.as_bytes())?;
        entries.push(TreeEntry::new(EntryMode::Regular, TAGS_ENTRY, index_id));
        let tree_id = store.add_tree(&Tree::new(entries))?;

        let sequence = parent.sequence + 1;
        let mut commit = Commit::new(tree_id)
            .with_parent(parent.commit)
            .with_attribute(SEQUENCE_KEY, sequence.to_string());
        for (key, value) in metadata {
            commit = commit.with_attribute(key.clone(), value.clone());
        }
        if !message.is_empty() {
            commit = commit.with_message(message);
        }
        let commit_id = store.add_commit(&commit)?;

        debug!(
            commit = %commit_id.short_hex(),
            sequence,
            tags = tags.len(),
            "derived tag snapshot"
        );
        Ok(Self {
            commit: Some(commit_id),
            parent: parent.commit,
            sequence,
            tags,
            root_modes,
        })
    }

    /// Successor with `name` bound to `content`; the replaced entry, if
    /// any, becomes the new entry's parent.
    pub fn with_tag(
        &self,
        store: &dyn ObjectStore,
        name: &TagPath,
        content: &ObjectId,
        message: &str,
        metadata: &Metadata,
    ) -> RepositoryResult<Self> {
        let mut attributes = metadata.clone();
        if !message.is_empty() {
            attributes.insert(MESSAGE_KEY.to_string(), message.to_string());
        }
        let previous = self.tags.get(name).map(RepositoryTagEntry::id);
        let entry =
            RepositoryTagEntry::create(store, name.clone(), *content, previous, attributes)?;

        let mut tags = self.tags.clone();
        tags.insert(name.clone(), entry);
        Self::derive(store, self, tags, message, metadata)
    }

    /// Successor without `name`, or `None` when the tag is absent.
    pub fn without_tag(
        &self,
        store: &dyn ObjectStore,
        name: &TagPath,
        message: &str,
        metadata: &Metadata,
    ) -> RepositoryResult<Option<Self>> {
        if !self.tags.contains_key(name) {
            return Ok(None);
        }
        let mut tags = self.tags.clone();
        tags.remove(name);
        Self::derive(store, self, tags, message, metadata).map(Some)
    }

    /// Commit recording this snapshot; `None` only for the empty map.
    pub fn commit(&self) -> Option<ObjectId> {
        self.commit
    }

    /// Commit of the snapshot this one was derived from.
    pub fn parent_commit(&self) -> Option<ObjectId> {
        self.parent
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn tags(&self) -> &BTreeMap<TagPath, RepositoryTagEntry> {
        &self.tags
    }

    pub fn get(&self, name: &TagPath) -> Option<&RepositoryTagEntry> {
        self.tags.get(name)
    }

    pub fn content_id(&self, name: &TagPath) -> Option<ObjectId> {
        self.tags.get(name).map(RepositoryTagEntry::content_id)
    }

    pub fn contains(&self, name: &TagPath) -> bool {
        self.tags.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Tags at or below `prefix`, in name order.
    pub fn under<'a>(
        &'a self,
        prefix: &'a TagPath,
    ) -> impl Iterator<Item = (&'a TagPath, &'a RepositoryTagEntry)> + 'a {
        self.tags
            .range(prefix.clone()..)
            .take_while(move |(name, _)| name.starts_with(prefix))
    }

    /// Names whose entry differs between `self` and `other`, including tags
    /// present in only one of them.
    pub fn changed_tags(&self, other: &RepositoryTagMap) -> Vec<TagPath> {
        let mut changed: Vec<TagPath> = self
            .tags
            .iter()
            .filter(|(name, entry)| other.tags.get(*name) != Some(*entry))
            .map(|(name, _)| name.clone())
            .collect();
        changed.extend(
            other
                .tags
                .keys()
                .filter(|name| !self.tags.contains_key(*name))
                .cloned(),
        );
        changed.sort();
        changed
    }
}
