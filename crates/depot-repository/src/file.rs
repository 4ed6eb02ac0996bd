//! A tag repository stored in a directory.
//!
//! ```text
//! <dir>/depot.toml     optional configuration
//! <dir>/objects/ab/..  loose objects
//! <dir>/refs/depot/root
//! ```
//!
//! Several processes may open the same directory: the root ref's lock file
//! serializes their installs.

use std::io::Read;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use depot_refs::FileRefStore;
use depot_store::{Commit, FileObjectStore, Tree};
use depot_types::{ObjectId, TagPath};

use crate::config::{RepositoryConfig, CONFIG_FILE};
use crate::engine::TagRepository;
use crate::entry::Metadata;
use crate::error::{RepositoryError, RepositoryResult};
use crate::listener::{ListenerId, TagListener};
use crate::repository::Repository;
use crate::tag_map::RepositoryTagMap;

const OBJECTS_DIR: &str = "objects";

#[derive(Debug)]
pub struct FileRepository {
    path: PathBuf,
    inner: TagRepository,
}

impl FileRepository {
    /// Open the repository at `path`, creating its directories if needed and
    /// reading `depot.toml` when present.
    pub fn open(path: impl AsRef<Path>) -> RepositoryResult<Self> {
        let path = path.as_ref();
        let config = RepositoryConfig::load_or_default(&path.join(CONFIG_FILE))?;
        Self::open_with_config(path, config)
    }

    /// Open with an explicit configuration, ignoring any `depot.toml`.
    pub fn open_with_config(
        path: impl AsRef<Path>,
        config: RepositoryConfig,
    ) -> RepositoryResult<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path).map_err(|e| {
            RepositoryError::Configuration(format!("cannot create {}: {e}", path.display()))
        })?;
        let store = FileObjectStore::open(path.join(OBJECTS_DIR))?;
        // Ref names are confined to `refs/`, so refs land under `<dir>/refs`
        // and never collide with objects or the config file.
        let refs = FileRefStore::open(&path)?;

        let inner = TagRepository::builder()
            .store(Arc::new(store))
            .refs(Arc::new(refs))
            .config(config)
            .open()?;
        Ok(Self { path, inner })
    }

    /// Create a repository at `path` and write `config` to its `depot.toml`.
    /// An existing configuration file is left untouched.
    pub fn init(path: impl AsRef<Path>, config: RepositoryConfig) -> RepositoryResult<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(|e| {
            RepositoryError::Configuration(format!("cannot create {}: {e}", path.display()))
        })?;
        let config_path = path.join(CONFIG_FILE);
        if !config_path.exists() {
            config.validate()?;
            std::fs::write(&config_path, config.to_toml_string()?).map_err(|e| {
                RepositoryError::Configuration(format!(
                    "cannot write {}: {e}",
                    config_path.display()
                ))
            })?;
            info!(path = %path.display(), "initialized repository");
        }
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn inner(&self) -> &TagRepository {
        &self.inner
    }
}

impl Deref for FileRepository {
    type Target = TagRepository;

    fn deref(&self) -> &TagRepository {
        &self.inner
    }
}

impl Repository for FileRepository {
    fn put_tag(
        &self,
        name: &TagPath,
        content: &ObjectId,
        message: &str,
        metadata: &Metadata,
    ) -> RepositoryResult<bool> {
        self.inner.put_tag(name, content, message, metadata)
    }

    fn remove_tag(
        &self,
        name: &TagPath,
        message: &str,
        metadata: &Metadata,
    ) -> RepositoryResult<bool> {
        self.inner.remove_tag(name, message, metadata)
    }

    fn copy_tag(
        &self,
        src: &TagPath,
        dst: &TagPath,
        message: &str,
        metadata: &Metadata,
    ) -> RepositoryResult<bool> {
        self.inner.copy_tag(src, dst, message, metadata)
    }

    fn tag_map(&self) -> Arc<RepositoryTagMap> {
        self.inner.tag_map()
    }

    fn tag_content_id(&self, name: &TagPath) -> Option<ObjectId> {
        self.inner.tag_content_id(name)
    }

    fn check_for_update(&self) -> RepositoryResult<bool> {
        self.inner.check_for_update()
    }

    fn add_listener(&self, path: &TagPath, listener: Arc<dyn TagListener>) -> ListenerId {
        self.inner.add_listener(path, listener)
    }

    fn remove_listener(&self, path: &TagPath, id: ListenerId) -> bool {
        self.inner.remove_listener(path, id)
    }

    fn add_blob(&self, data: &[u8]) -> RepositoryResult<ObjectId> {
        self.inner.add_blob(data)
    }

    fn open_blob(&self, id: &ObjectId) -> RepositoryResult<Box<dyn Read + Send>> {
        self.inner.open_blob(id)
    }

    fn add_tree(&self, tree: &Tree) -> RepositoryResult<ObjectId> {
        self.inner.add_tree(tree)
    }

    fn read_tree(&self, id: &ObjectId) -> RepositoryResult<Tree> {
        self.inner.read_tree(id)
    }

    fn add_commit(&self, commit: &Commit) -> RepositoryResult<ObjectId> {
        self.inner.add_commit(commit)
    }

    fn read_commit(&self, id: &ObjectId) -> RepositoryResult<Commit> {
        self.inner.read_commit(id)
    }

    fn validate_hash(&self, id: &ObjectId) -> RepositoryResult<bool> {
        self.inner.validate_hash(id)
    }
}
