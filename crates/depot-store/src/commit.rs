//! Commit objects.
//!
//! A commit names a tree, optionally a parent commit, and carries free-form
//! attributes. On disk it is a header block (see [`crate::header`]):
//!
//! ```text
//! tree: <hex>
//! parent: <hex>
//! sequence: 7
//!
//! message
//! ```
//!
//! `tree` and `parent` come first; attributes follow in key order.

use std::collections::BTreeMap;

use depot_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::header::Headers;
use crate::object::{ObjectKind, StoredObject};

const TREE_KEY: &str = "tree";
const PARENT_KEY: &str = "parent";

/// A version node: a tree plus provenance and attributes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectId,
    pub parent: Option<ObjectId>,
    /// Free-form attributes; `tree` and `parent` are reserved.
    pub attributes: BTreeMap<String, String>,
    pub message: Option<String>,
}

impl Commit {
    pub fn new(tree: ObjectId) -> Self {
        Self {
            tree,
            parent: None,
            attributes: BTreeMap::new(),
            message: None,
        }
    }

    pub fn with_parent(mut self, parent: Option<ObjectId>) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Returns `true` for keys the encoding reserves for itself.
    pub fn is_reserved_key(key: &str) -> bool {
        key == TREE_KEY || key == PARENT_KEY
    }

    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        let mut headers = Headers::new();
        let bad_key = |e: crate::header::HeaderError| StoreError::Serialization(e.to_string());

        headers.push(TREE_KEY, &self.tree.to_hex()).map_err(bad_key)?;
        if let Some(parent) = &self.parent {
            headers.push(PARENT_KEY, &parent.to_hex()).map_err(bad_key)?;
        }
        for (key, value) in &self.attributes {
            if Self::is_reserved_key(key) {
                return Err(StoreError::Serialization(format!(
                    "commit attribute {key:?} is reserved"
                )));
            }
            headers.push(key, value).map_err(bad_key)?;
        }
        if let Some(message) = &self.message {
            headers.set_body(message.clone());
        }
        Ok(StoredObject::new(
            ObjectKind::Commit,
            headers.encode().into_bytes(),
        ))
    }

    /// Decode the object stored under `id`.
    pub fn from_stored_object(id: &ObjectId, obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(id, ObjectKind::Commit)?;
        let corrupt = |reason: String| StoreError::CorruptObject { id: *id, reason };

        let text = std::str::from_utf8(&obj.data).map_err(|e| corrupt(e.to_string()))?;
        let headers = Headers::parse(text).map_err(|e| corrupt(e.to_string()))?;

        let tree = headers
            .get(TREE_KEY)
            .ok_or_else(|| corrupt("missing tree".into()))?;
        let tree = ObjectId::from_hex(tree).map_err(|e| corrupt(e.to_string()))?;
        let parent = headers
            .get(PARENT_KEY)
            .map(ObjectId::from_hex)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;

        let attributes = headers
            .fields()
            .filter(|(k, _)| !Self::is_reserved_key(k))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Ok(Self {
            tree,
            parent,
            attributes,
            message: headers.body().map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_tree_parent_then_attributes() {
        let tree = ObjectId::digest(b"tree");
        let parent = ObjectId::digest(b"parent");
        let commit = Commit::new(tree)
            .with_parent(Some(parent))
            .with_attribute("sequence", "2")
            .with_attribute("author", "ops")
            .with_message("deploy v2");
        let stored = commit.to_stored_object().unwrap();
        let text = String::from_utf8(stored.data).unwrap();
        assert_eq!(
            text,
            format!("tree: {tree}\nparent: {parent}\nauthor: ops\nsequence: 2\n\ndeploy v2")
        );
    }

    #[test]
    fn roundtrip_preserves_everything() {
        let commit = Commit::new(ObjectId::digest(b"t"))
            .with_attribute("sequence", "1")
            .with_attribute("note", "multi\nline")
            .with_message("first\nrelease\n");
        let stored = commit.to_stored_object().unwrap();
        let id = stored.compute_id();
        assert_eq!(Commit::from_stored_object(&id, &stored).unwrap(), commit);
    }

    #[test]
    fn new_commit_carries_only_its_tree() {
        let tree = ObjectId::digest(b"t");
        let commit = Commit::new(tree);
        assert_eq!(commit.tree, tree);
        assert_eq!(commit.parent, None);
        assert!(commit.attributes.is_empty());
        assert_eq!(commit.message, None);
    }

    #[test]
    fn root_commit_has_no_parent() {
        let commit = Commit::new(ObjectId::digest(b"t"));
        let stored = commit.to_stored_object().unwrap();
        let id = stored.compute_id();
        let decoded = Commit::from_stored_object(&id, &stored).unwrap();
        assert!(decoded.parent.is_none());
        assert!(decoded.message.is_none());
    }

    #[test]
    fn reserved_attribute_is_rejected() {
        let commit = Commit::new(ObjectId::digest(b"t")).with_attribute("parent", "x");
        assert!(matches!(
            commit.to_stored_object(),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn missing_tree_is_corrupt() {
        let stored = StoredObject::new(ObjectKind::Commit, b"sequence: 1\n".to_vec());
        let id = stored.compute_id();
        assert!(matches!(
            Commit::from_stored_object(&id, &stored),
            Err(StoreError::CorruptObject { .. })
        ));
    }

    #[test]
    fn wrong_kind_is_reported() {
        let stored = StoredObject::new(ObjectKind::Blob, b"tree: x\n".to_vec());
        let id = stored.compute_id();
        assert!(matches!(
            Commit::from_stored_object(&id, &stored),
            Err(StoreError::WrongKind { .. })
        ));
    }
}
