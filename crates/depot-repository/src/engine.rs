//! The tag repository update engine.
//!
//! [`TagRepository`] keeps the installed [`RepositoryTagMap`] behind an
//! [`ArcSwap`]: readers load one immutable snapshot without locking and never
//! observe a partial update. Writers follow an optimistic loop:
//!
//! 1. refresh from the durable root ref
//! 2. validate the new content
//! 3. derive a candidate snapshot from the current one
//! 4. install it in a short critical section that also compare-and-swaps
//!    the durable root ref from the candidate's parent to the candidate
//!
//! Losing step 4 to another writer (in this process or another one sharing
//! the ref store) discards the candidate and starts over, up to
//! `max_retries` attempts with exponential backoff in between.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use arc_swap::ArcSwap;
use tracing::{debug, info, warn};

use depot_refs::{RefError, RefStore};
use depot_store::{Commit, ObjectKind, ObjectStore, Tree};
use depot_types::{ObjectId, TagPath, TypeError};

use crate::config::RepositoryConfig;
use crate::entry::{check_metadata, Metadata};
use crate::error::{RepositoryError, RepositoryResult};
use crate::listener::{ListenerId, ListenerRegistry, TagListener};
use crate::tag_map::{RepositoryTagMap, SEQUENCE_KEY};
use crate::validate::Validator;

/// Where an install candidate came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    /// Derived here; the durable root ref must be swapped to it.
    Local,
    /// Read from the durable root ref; already persisted.
    Durable,
}

/// Outcome of one install attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Install {
    Installed,
    /// The installed snapshot is already at or past the candidate's sequence.
    Stale,
    /// Another writer moved the durable root ref first.
    Lost,
}

/// One snapshot in the repository history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub commit: ObjectId,
    pub sequence: u64,
    pub message: Option<String>,
    /// Caller metadata recorded with the mutation.
    pub attributes: Metadata,
}

pub struct TagRepository {
    store: Arc<dyn ObjectStore>,
    refs: Arc<dyn RefStore>,
    config: RepositoryConfig,
    current: ArcSwap<RepositoryTagMap>,
    install_lock: Mutex<()>,
    validator: Validator,
    listeners: ListenerRegistry,
    closed: AtomicBool,
}

/// Assembles a [`TagRepository`] from its collaborators.
#[derive(Default)]
pub struct TagRepositoryBuilder {
    store: Option<Arc<dyn ObjectStore>>,
    refs: Option<Arc<dyn RefStore>>,
    config: Option<RepositoryConfig>,
}

impl TagRepositoryBuilder {
    /// Object store holding content, tag entries and snapshots. Required.
    pub fn store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Ref store holding the root ref. Required.
    pub fn refs(mut self, refs: Arc<dyn RefStore>) -> Self {
        self.refs = Some(refs);
        self
    }

    /// Defaults apply when unset.
    pub fn config(mut self, config: RepositoryConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build an engine holding the empty snapshot. Nothing is read from
    /// storage until the first refresh.
    pub fn build(self) -> RepositoryResult<TagRepository> {
        let store = self
            .store
            .ok_or_else(|| RepositoryError::Configuration("no object store configured".into()))?;
        let refs = self
            .refs
            .ok_or_else(|| RepositoryError::Configuration("no ref store configured".into()))?;
        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(TagRepository {
            store,
            refs,
            validator: Validator::new(config.validation_cache_capacity),
            config,
            current: ArcSwap::from_pointee(RepositoryTagMap::empty()),
            install_lock: Mutex::new(()),
            listeners: ListenerRegistry::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Build, then load the snapshot the durable root ref names.
    pub fn open(self) -> RepositoryResult<TagRepository> {
        let repo = self.build()?;
        repo.check_for_update()?;
        Ok(repo)
    }
}

impl TagRepository {
    /// Start assembling an engine; see [`TagRepositoryBuilder`].
    pub fn builder() -> TagRepositoryBuilder {
        TagRepositoryBuilder::default()
    }

    /// The validated configuration this engine runs with.
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// The backing object store.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// The ref store holding the durable root ref.
    pub fn refs(&self) -> &Arc<dyn RefStore> {
        &self.refs
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// The installed snapshot.
    pub fn tag_map(&self) -> Arc<RepositoryTagMap> {
        self.current.load_full()
    }

    /// Content root `name` is bound to in the installed snapshot.
    pub fn tag_content_id(&self, name: &TagPath) -> Option<ObjectId> {
        self.current.load().content_id(name)
    }

    /// Sequence number of the installed snapshot; 0 before the first write.
    pub fn sequence(&self) -> u64 {
        self.current.load().sequence()
    }

    /// Installed snapshot and its ancestors, newest first, at most `limit`.
    pub fn history(&self, limit: usize) -> RepositoryResult<Vec<SnapshotInfo>> {
        let mut out = Vec::new();
        let mut next = self.current.load().commit();
        while let Some(id) = next {
            if out.len() >= limit {
                break;
            }
            let commit = self.store.read_commit(&id)?;
            let sequence = commit
                .attribute(SEQUENCE_KEY)
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| RepositoryError::CorruptSnapshot {
                    id,
                    reason: "snapshot commit has no valid sequence".into(),
                })?;
            next = commit.parent;
            let mut attributes = commit.attributes;
            attributes.remove(SEQUENCE_KEY);
            out.push(SnapshotInfo {
                commit: id,
                sequence,
                message: commit.message,
                attributes,
            });
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------

    /// Install the snapshot named by the durable root ref, if it is newer.
    ///
    /// Returns `true` when already current (or when no snapshot has ever
    /// been written) and `false` when a different snapshot was found.
    pub fn check_for_update(&self) -> RepositoryResult<bool> {
        self.ensure_open()?;
        match self.refs.read_ref(&self.config.root_ref)? {
            None => Ok(true),
            Some(id) => self.update(&id),
        }
    }

    /// Install the snapshot recorded by commit `id`, without touching the
    /// durable root ref.
    ///
    /// Returns `true` if `id` is already installed, otherwise validates and
    /// loads it, installs it when its sequence is newer, and returns `false`.
    pub fn update(&self, id: &ObjectId) -> RepositoryResult<bool> {
        self.ensure_open()?;
        if self.current.load().commit() == Some(*id) {
            return Ok(true);
        }
        if let Some(missing) = self.validator.find_missing(&*self.store, id)? {
            return Err(RepositoryError::Validation { id: *id, missing });
        }
        let map = RepositoryTagMap::load(&*self.store, id)?;
        self.install(Arc::new(map), Source::Durable)?;
        Ok(false)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Bind `name` to `content`, replacing any previous binding.
    ///
    /// Fails with [`RepositoryError::Validation`] if any object reachable
    /// from `content` is missing; nothing is installed in that case.
    pub fn put_tag(
        &self,
        name: &TagPath,
        content: &ObjectId,
        message: &str,
        metadata: &Metadata,
    ) -> RepositoryResult<bool> {
        check_taggable(name)?;
        check_metadata(metadata)?;

        self.mutate(name, |base| {
            self.ensure_complete(content)?;
            base.with_tag(&*self.store, name, content, message, metadata)
                .map(Some)
        })
    }

    /// Bind `dst` to the content `src` is bound to, replacing any previous
    /// binding of `dst`.
    ///
    /// `src` is resolved against the freshest snapshot on every attempt, so
    /// a concurrent retag of `src` is honored. Fails with
    /// [`RepositoryError::TagNotFound`] when `src` is not bound.
    pub fn copy_tag(
        &self,
        src: &TagPath,
        dst: &TagPath,
        message: &str,
        metadata: &Metadata,
    ) -> RepositoryResult<bool> {
        check_taggable(dst)?;
        check_metadata(metadata)?;

        self.mutate(dst, |base| {
            let content = base
                .content_id(src)
                .ok_or_else(|| RepositoryError::TagNotFound { name: src.clone() })?;
            self.ensure_complete(&content)?;
            base.with_tag(&*self.store, dst, &content, message, metadata)
                .map(Some)
        })
    }

    /// Remove `name`. Removing an absent tag succeeds without writing a
    /// snapshot.
    pub fn remove_tag(
        &self,
        name: &TagPath,
        message: &str,
        metadata: &Metadata,
    ) -> RepositoryResult<bool> {
        check_metadata(metadata)?;
        self.mutate(name, |base| {
            base.without_tag(&*self.store, name, message, metadata)
        })
    }

    /// Install a locally derived snapshot.
    ///
    /// The candidate must have been derived from the snapshot its parent
    /// commit names. Returns whether it was installed: `false` when the
    /// installed sequence is already at or past the candidate's, or when
    /// the durable root ref no longer names the candidate's parent.
    pub fn set_tag_map(&self, candidate: RepositoryTagMap) -> RepositoryResult<bool> {
        self.ensure_open()?;
        Ok(self.install(Arc::new(candidate), Source::Local)? == Install::Installed)
    }

    /// Whether every object reachable from `id` is stored.
    pub fn validate_hash(&self, id: &ObjectId) -> RepositoryResult<bool> {
        Ok(self.validator.is_valid(&*self.store, id)?)
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Register `listener` for changes to `path` or any tag below it.
    pub fn add_listener(&self, path: &TagPath, listener: Arc<dyn TagListener>) -> ListenerId {
        self.listeners.add(path.clone(), listener)
    }

    /// Unregister a listener. Returns `false` if it was not registered on
    /// `path`.
    pub fn remove_listener(&self, path: &TagPath, id: ListenerId) -> bool {
        self.listeners.remove(path, id)
    }

    // ------------------------------------------------------------------
    // Object pass-through
    // ------------------------------------------------------------------

    /// Store `data` as a blob and return its id.
    pub fn add_blob(&self, data: &[u8]) -> RepositoryResult<ObjectId> {
        Ok(self.store.add_blob(data)?)
    }

    /// Stream a stored blob.
    pub fn open_blob(&self, id: &ObjectId) -> RepositoryResult<Box<dyn Read + Send>> {
        Ok(self.store.open_blob(id)?)
    }

    /// Read a whole blob into memory.
    pub fn read_blob(&self, id: &ObjectId) -> RepositoryResult<Vec<u8>> {
        Ok(self.store.read_blob(id)?)
    }

    /// Store a tree. Its children are not checked; use
    /// [`validate_hash`](Self::validate_hash) for that.
    pub fn add_tree(&self, tree: &Tree) -> RepositoryResult<ObjectId> {
        Ok(self.store.add_tree(tree)?)
    }

    /// Decode the tree stored under `id`.
    pub fn read_tree(&self, id: &ObjectId) -> RepositoryResult<Tree> {
        Ok(self.store.read_tree(id)?)
    }

    /// Store a commit. Its tree and parent are not checked.
    pub fn add_commit(&self, commit: &Commit) -> RepositoryResult<ObjectId> {
        Ok(self.store.add_commit(commit)?)
    }

    /// Decode the commit stored under `id`.
    pub fn read_commit(&self, id: &ObjectId) -> RepositoryResult<Commit> {
        Ok(self.store.read_commit(id)?)
    }

    /// Kind of the object stored under `id`, or `None` if absent.
    pub fn object_kind(&self, id: &ObjectId) -> RepositoryResult<Option<ObjectKind>> {
        Ok(self.store.kind(id)?)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Stop accepting mutations. Retry loops in flight give up before
    /// their next attempt. Reads keep working.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("tag repository closed");
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_open(&self) -> RepositoryResult<()> {
        if self.is_closed() {
            return Err(RepositoryError::Closed);
        }
        Ok(())
    }

    fn ensure_complete(&self, content: &ObjectId) -> RepositoryResult<()> {
        match self.validator.find_missing(&*self.store, content)? {
            Some(missing) => Err(RepositoryError::Validation {
                id: *content,
                missing,
            }),
            None => Ok(()),
        }
    }

    /// Run the optimistic update loop. `derive` builds a candidate from the
    /// freshest snapshot, or returns `None` when there is nothing to change.
    fn mutate<F>(&self, name: &TagPath, mut derive: F) -> RepositoryResult<bool>
    where
        F: FnMut(&RepositoryTagMap) -> RepositoryResult<Option<RepositoryTagMap>>,
    {
        let attempts = self.config.max_retries;
        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.config.backoff(attempt);
                debug!(tag = %name, attempt, ?delay, "lost update race, retrying");
                thread::sleep(delay);
            }
            self.check_for_update()?;

            let base = self.current.load_full();
            let Some(candidate) = derive(base.as_ref())? else {
                debug!(tag = %name, "nothing to change");
                return Ok(true);
            };
            match self.install(Arc::new(candidate), Source::Local)? {
                Install::Installed => return Ok(true),
                Install::Stale | Install::Lost => {}
            }
        }
        warn!(tag = %name, attempts, "giving up after repeated update conflicts");
        Err(RepositoryError::TooManyConflicts { attempts })
    }

    /// The install critical section: an in-memory sequence check plus, for
    /// local candidates, the durable compare-and-swap. Listeners run after
    /// the lock is released.
    fn install(&self, candidate: Arc<RepositoryTagMap>, source: Source) -> RepositoryResult<Install> {
        let previous = {
            let _guard = self.install_lock.lock().expect("lock poisoned");
            let current = self.current.load_full();
            if candidate.sequence() <= current.sequence() {
                return Ok(Install::Stale);
            }
            if source == Source::Local {
                let Some(new_root) = candidate.commit() else {
                    return Ok(Install::Stale);
                };
                let expected = candidate.parent_commit();
                match self
                    .refs
                    .compare_and_swap(&self.config.root_ref, expected.as_ref(), &new_root)
                {
                    Ok(true) => {}
                    Ok(false) | Err(RefError::Locked { .. }) => return Ok(Install::Lost),
                    Err(e) => return Err(e.into()),
                }
            }
            self.current.store(Arc::clone(&candidate));
            current
        };

        info!(
            sequence = candidate.sequence(),
            commit = %candidate.commit().map(|c| c.short_hex()).unwrap_or_default(),
            tags = candidate.len(),
            durable = source == Source::Durable,
            "installed tag snapshot"
        );
        let changed = candidate.changed_tags(&previous);
        self.listeners.notify(&changed);
        Ok(Install::Installed)
    }
}

fn check_taggable(name: &TagPath) -> RepositoryResult<()> {
    if name.is_root() {
        return Err(TypeError::InvalidTagName {
            name: String::new(),
            reason: "the root path cannot be tagged".into(),
        }
        .into());
    }
    Ok(())
}

impl std::fmt::Debug for TagRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self.current.load();
        f.debug_struct("TagRepository")
            .field("root_ref", &self.config.root_ref)
            .field("sequence", &current.sequence())
            .field("tags", &current.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
