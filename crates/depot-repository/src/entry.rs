//! Tag entries: one tag name bound to one content root.
//!
//! An entry is stored as a blob of header lines:
//!
//! ```text
//! tag: webapps/foo
//! root: 5e1f...
//! parent: 09ab...
//! message: deploy 1.2
//! user: ops
//! ```
//!
//! `parent` names the entry this one replaced and is omitted for the first
//! entry of a tag. Lines after the three core lines are free-form attributes.
//! The blob id is the entry's identity.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use depot_store::header::Headers;
use depot_store::ObjectStore;
use depot_types::{ObjectId, TagPath};

use crate::error::{RepositoryError, RepositoryResult};

const TAG_KEY: &str = "tag";
const ROOT_KEY: &str = "root";
const PARENT_KEY: &str = "parent";

/// Caller-supplied attributes recorded on entries and snapshot commits.
pub type Metadata = BTreeMap<String, String>;

/// Attribute key under which the mutation message is recorded on an entry.
pub const MESSAGE_KEY: &str = "message";

/// Keys callers cannot use as metadata: the entry and snapshot encodings
/// own them.
pub const RESERVED_KEYS: [&str; 6] = [TAG_KEY, ROOT_KEY, PARENT_KEY, "tree", "sequence", MESSAGE_KEY];

/// Reject metadata that would collide with encoded fields or break the
/// header format.
pub fn check_metadata(metadata: &Metadata) -> RepositoryResult<()> {
    for key in metadata.keys() {
        if RESERVED_KEYS.contains(&key.as_str()) {
            return Err(RepositoryError::InvalidMetadata {
                key: key.clone(),
                reason: "key is reserved".into(),
            });
        }
        if let Err(e) = Headers::new().push(key, "") {
            return Err(RepositoryError::InvalidMetadata {
                key: key.clone(),
                reason: e.to_string(),
            });
        }
    }
    Ok(())
}

/// An immutable binding of a tag name to a content root.
#[derive(Clone, Debug)]
pub struct RepositoryTagEntry {
    id: ObjectId,
    name: TagPath,
    content: ObjectId,
    parent: Option<ObjectId>,
    attributes: Metadata,
}

impl RepositoryTagEntry {
    /// Serialize a new entry and store it as a blob.
    pub fn create(
        store: &dyn ObjectStore,
        name: TagPath,
        content: ObjectId,
        parent: Option<ObjectId>,
        attributes: Metadata,
    ) -> RepositoryResult<Self> {
        let data = encode(&name, &content, parent.as_ref(), &attributes)?;
        let id = store.add_blob(data.as_bytes())?;
        Ok(Self {
            id,
            name,
            content,
            parent,
            attributes,
        })
    }

    /// Read back the entry stored under `id`.
    pub fn load(store: &dyn ObjectStore, id: &ObjectId) -> RepositoryResult<Self> {
        let data = store.read_blob(id)?;
        decode(id, &data)
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &TagPath {
        &self.name
    }

    /// Root of the content this tag points at.
    pub fn content_id(&self) -> ObjectId {
        self.content
    }

    /// The entry this one replaced, if any.
    pub fn parent_id(&self) -> Option<ObjectId> {
        self.parent
    }

    pub fn attributes(&self) -> &Metadata {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn message(&self) -> Option<&str> {
        self.attribute(MESSAGE_KEY)
    }
}

impl PartialEq for RepositoryTagEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RepositoryTagEntry {}

impl Hash for RepositoryTagEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

fn encode(
    name: &TagPath,
    content: &ObjectId,
    parent: Option<&ObjectId>,
    attributes: &Metadata,
) -> RepositoryResult<String> {
    let invalid = |key: &str, e: depot_store::header::HeaderError| {
        RepositoryError::InvalidMetadata {
            key: key.to_string(),
            reason: e.to_string(),
        }
    };

    let mut headers = Headers::new();
    headers
        .push(TAG_KEY, &name.as_string())
        .map_err(|e| invalid(TAG_KEY, e))?;
    headers
        .push(ROOT_KEY, &content.to_hex())
        .map_err(|e| invalid(ROOT_KEY, e))?;
    if let Some(parent) = parent {
        headers
            .push(PARENT_KEY, &parent.to_hex())
            .map_err(|e| invalid(PARENT_KEY, e))?;
    }
    for (key, value) in attributes {
        if key == TAG_KEY || key == ROOT_KEY || key == PARENT_KEY {
            return Err(RepositoryError::InvalidMetadata {
                key: key.clone(),
                reason: "key is reserved".into(),
            });
        }
        headers.push(key, value).map_err(|e| invalid(key, e))?;
    }
    Ok(headers.encode())
}

fn decode(id: &ObjectId, data: &[u8]) -> RepositoryResult<RepositoryTagEntry> {
    let corrupt = |reason: String| RepositoryError::CorruptSnapshot { id: *id, reason };

    let text = std::str::from_utf8(data).map_err(|e| corrupt(format!("tag entry: {e}")))?;
    let headers = Headers::parse(text).map_err(|e| corrupt(format!("tag entry: {e}")))?;

    let name = headers
        .get(TAG_KEY)
        .ok_or_else(|| corrupt("tag entry has no tag line".into()))?;
    let name = TagPath::parse(name).map_err(|e| corrupt(e.to_string()))?;
    if name.is_root() {
        return Err(corrupt("tag entry names the root path".into()));
    }
    let content = headers
        .get(ROOT_KEY)
        .ok_or_else(|| corrupt("tag entry has no root line".into()))?;
    let content = ObjectId::from_hex(content).map_err(|e| corrupt(e.to_string()))?;
    let parent = headers
        .get(PARENT_KEY)
        .map(ObjectId::from_hex)
        .transpose()
        .map_err(|e| corrupt(e.to_string()))?;

    let attributes = headers
        .fields()
        .filter(|(k, _)| *k != TAG_KEY && *k != ROOT_KEY && *k != PARENT_KEY)
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    Ok(RepositoryTagEntry {
        id: *id,
        name,
        content,
        parent,
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_store::InMemoryObjectStore;

    fn path(s: &str) -> TagPath {
        TagPath::parse(s).unwrap()
    }

    #[test]
    fn create_stores_a_blob_that_loads_back() {
        let store = InMemoryObjectStore::new();
        let content = store.add_blob(b"app.war").unwrap();
        let mut attrs = Metadata::new();
        attrs.insert(MESSAGE_KEY.into(), "first deploy".into());
        attrs.insert("user".into(), "ops".into());

        let entry =
            RepositoryTagEntry::create(&store, path("webapps/foo"), content, None, attrs).unwrap();
        assert!(store.exists(&entry.id()).unwrap());

        let loaded = RepositoryTagEntry::load(&store, &entry.id()).unwrap();
        assert_eq!(loaded, entry);
        assert_eq!(loaded.name(), &path("webapps/foo"));
        assert_eq!(loaded.content_id(), content);
        assert_eq!(loaded.parent_id(), None);
        assert_eq!(loaded.message(), Some("first deploy"));
        assert_eq!(loaded.attribute("user"), Some("ops"));
    }

    #[test]
    fn encoding_layout() {
        let content = ObjectId::from_hash([1; 32]);
        let parent = ObjectId::from_hash([2; 32]);
        let text = encode(&path("a/b"), &content, Some(&parent), &Metadata::new()).unwrap();
        assert_eq!(
            text,
            format!("tag: a/b\nroot: {content}\nparent: {parent}\n")
        );
    }

    #[test]
    fn parent_chain_is_preserved() {
        let store = InMemoryObjectStore::new();
        let v1 = store.add_blob(b"v1").unwrap();
        let v2 = store.add_blob(b"v2").unwrap();
        let first =
            RepositoryTagEntry::create(&store, path("t"), v1, None, Metadata::new()).unwrap();
        let second =
            RepositoryTagEntry::create(&store, path("t"), v2, Some(first.id()), Metadata::new())
                .unwrap();

        let loaded = RepositoryTagEntry::load(&store, &second.id()).unwrap();
        assert_eq!(loaded.parent_id(), Some(first.id()));
        assert_ne!(first, second);
    }

    #[test]
    fn identical_entries_share_an_id() {
        let store = InMemoryObjectStore::new();
        let content = store.add_blob(b"x").unwrap();
        let a = RepositoryTagEntry::create(&store, path("t"), content, None, Metadata::new())
            .unwrap();
        let b = RepositoryTagEntry::create(&store, path("t"), content, None, Metadata::new())
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn multiline_attributes_survive() {
        let store = InMemoryObjectStore::new();
        let content = store.add_blob(b"x").unwrap();
        let mut attrs = Metadata::new();
        attrs.insert(MESSAGE_KEY.into(), "line one\nline two\\".into());
        let entry = RepositoryTagEntry::create(&store, path("t"), content, None, attrs).unwrap();
        let loaded = RepositoryTagEntry::load(&store, &entry.id()).unwrap();
        assert_eq!(loaded.message(), Some("line one\nline two\\"));
    }

    #[test]
    fn garbage_blob_is_corrupt() {
        let store = InMemoryObjectStore::new();
        let id = store.add_blob(b"root: nothex\n").unwrap();
        assert!(matches!(
            RepositoryTagEntry::load(&store, &id),
            Err(RepositoryError::CorruptSnapshot { .. })
        ));

        let id = store.add_blob(&[0xff, 0xfe]).unwrap();
        assert!(matches!(
            RepositoryTagEntry::load(&store, &id),
            Err(RepositoryError::CorruptSnapshot { .. })
        ));
    }

    #[test]
    fn missing_entry_is_a_store_error() {
        let store = InMemoryObjectStore::new();
        assert!(matches!(
            RepositoryTagEntry::load(&store, &ObjectId::from_hash([9; 32])),
            Err(RepositoryError::Store(_))
        ));
    }

    #[test]
    fn metadata_checks() {
        let mut ok = Metadata::new();
        ok.insert("user".into(), "ops".into());
        assert!(check_metadata(&ok).is_ok());

        for key in ["tag", "sequence", "message", "has space", ""] {
            let mut bad = Metadata::new();
            bad.insert(key.into(), "v".into());
            assert!(
                matches!(
                    check_metadata(&bad),
                    Err(RepositoryError::InvalidMetadata { .. })
                ),
                "{key:?} should be rejected"
            );
        }
    }
}
