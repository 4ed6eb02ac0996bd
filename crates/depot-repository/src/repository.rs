use std::io::Read;
use std::sync::Arc;

use depot_store::{Commit, Tree};
use depot_types::{ObjectId, TagPath};

use crate::engine::TagRepository;
use crate::entry::Metadata;
use crate::error::RepositoryResult;
use crate::listener::{ListenerId, TagListener};
use crate::tag_map::RepositoryTagMap;

/// The surface higher layers program against: tag mutations, snapshot
/// reads, change listeners, and the object operations used to stage content
/// before tagging it.
pub trait Repository: Send + Sync {
    fn put_tag(
        &self,
        name: &TagPath,
        content: &ObjectId,
        message: &str,
        metadata: &Metadata,
    ) -> RepositoryResult<bool>;

    fn remove_tag(&self, name: &TagPath, message: &str, metadata: &Metadata)
        -> RepositoryResult<bool>;

    fn copy_tag(
        &self,
        src: &TagPath,
        dst: &TagPath,
        message: &str,
        metadata: &Metadata,
    ) -> RepositoryResult<bool>;

    fn tag_map(&self) -> Arc<RepositoryTagMap>;

    fn tag_content_id(&self, name: &TagPath) -> Option<ObjectId>;

    fn check_for_update(&self) -> RepositoryResult<bool>;

    fn add_listener(&self, path: &TagPath, listener: Arc<dyn TagListener>) -> ListenerId;

    fn remove_listener(&self, path: &TagPath, id: ListenerId) -> bool;

    fn add_blob(&self, data: &[u8]) -> RepositoryResult<ObjectId>;

    fn open_blob(&self, id: &ObjectId) -> RepositoryResult<Box<dyn Read + Send>>;

    fn add_tree(&self, tree: &Tree) -> RepositoryResult<ObjectId>;

    fn read_tree(&self, id: &ObjectId) -> RepositoryResult<Tree>;

    fn add_commit(&self, commit: &Commit) -> RepositoryResult<ObjectId>;

    fn read_commit(&self, id: &ObjectId) -> RepositoryResult<Commit>;

    fn validate_hash(&self, id: &ObjectId) -> RepositoryResult<bool>;
}

impl Repository for TagRepository {
    fn put_tag(
        &self,
        name: &TagPath,
        content: &ObjectId,
        message: &str,
        metadata: &Metadata,
    ) -> RepositoryResult<bool> {
        TagRepository::put_tag(self, name, content, message, metadata)
    }

    fn remove_tag(
        &self,
        name: &TagPath,
        message: &str,
        metadata: &Metadata,
    ) -> RepositoryResult<bool> {
        TagRepository::remove_tag(self, name, message, metadata)
    }

    fn copy_tag(
        &self,
        src: &TagPath,
        dst: &TagPath,
        message: &str,
        metadata: &Metadata,
    ) -> RepositoryResult<bool> {
        TagRepository::copy_tag(self, src, dst, message, metadata)
    }

    fn tag_map(&self) -> Arc<RepositoryTagMap> {
        TagRepository::tag_map(self)
    }

    fn tag_content_id(&self, name: &TagPath) -> Option<ObjectId> {
        TagRepository::tag_content_id(self, name)
    }

    fn check_for_update(&self) -> RepositoryResult<bool> {
        TagRepository::check_for_update(self)
    }

    fn add_listener(&self, path: &TagPath, listener: Arc<dyn TagListener>) -> ListenerId {
        TagRepository::add_listener(self, path, listener)
    }

    fn remove_listener(&self, path: &TagPath, id: ListenerId) -> bool {
        TagRepository::remove_listener(self, path, id)
    }

    fn add_blob(&self, data: &[u8]) -> RepositoryResult<ObjectId> {
        TagRepository::add_blob(self, data)
    }

    fn open_blob(&self, id: &ObjectId) -> RepositoryResult<Box<dyn Read + Send>> {
        TagRepository::open_blob(self, id)
    }

    fn add_tree(&self, tree: &Tree) -> RepositoryResult<ObjectId> {
        TagRepository::add_tree(self, tree)
    }

    fn read_tree(&self, id: &ObjectId) -> RepositoryResult<Tree> {
        TagRepository::read_tree(self, id)
    }

    fn add_commit(&self, commit: &Commit) -> RepositoryResult<ObjectId> {
        TagRepository::add_commit(self, commit)
    }

    fn read_commit(&self, id: &ObjectId) -> RepositoryResult<Commit> {
        TagRepository::read_commit(self, id)
    }

    fn validate_hash(&self, id: &ObjectId) -> RepositoryResult<bool> {
        TagRepository::validate_hash(self, id)
    }
}

#[cfg(test)]
mod tests {
    use depot_refs::InMemoryRefStore;
    use depot_store::InMemoryObjectStore;

    use super::*;

    fn as_dyn() -> Box<dyn Repository> {
        Box::new(
            TagRepository::builder()
                .store(Arc::new(InMemoryObjectStore::new()))
                .refs(Arc::new(InMemoryRefStore::new()))
                .open()
                .unwrap(),
        )
    }

    #[test]
    fn usable_as_trait_object() {
        let repo = as_dyn();
        let c = repo.add_blob(b"c").unwrap();
        let name = TagPath::parse("webapps/foo").unwrap();
        assert!(repo.put_tag(&name, &c, "", &Metadata::new()).unwrap());
        assert_eq!(repo.tag_content_id(&name), Some(c));
        assert!(repo.check_for_update().unwrap());

        let copy = TagPath::parse("webapps/bar").unwrap();
        assert!(repo.copy_tag(&name, &copy, "", &Metadata::new()).unwrap());
        assert_eq!(repo.tag_content_id(&copy), Some(c));

        assert!(repo.remove_tag(&name, "", &Metadata::new()).unwrap());
        assert!(repo.remove_tag(&copy, "", &Metadata::new()).unwrap());
        assert!(repo.tag_map().is_empty());
    }
}
