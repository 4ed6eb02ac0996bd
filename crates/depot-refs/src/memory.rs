//! In-memory reference store for testing and ephemeral use.
//!
//! [`InMemoryRefStore`] keeps all refs in a `BTreeMap` behind a `RwLock`.
//! Share one instance (through an `Arc`) between several repositories to
//! model nodes of a cluster racing on the same durable pointer.

use std::collections::BTreeMap;
use std::sync::RwLock;

use depot_types::ObjectId;

use crate::error::Result;
use crate::names::validate_ref_name;
use crate::traits::RefStore;

#[derive(Debug, Default)]
pub struct InMemoryRefStore {
    refs: RwLock<BTreeMap<String, ObjectId>>,
}

impl InMemoryRefStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RefStore for InMemoryRefStore {
    fn read_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        let refs = self.refs.read().expect("lock poisoned");
        Ok(refs.get(name).copied())
    }

    fn write_ref(&self, name: &str, target: &ObjectId) -> Result<()> {
        validate_ref_name(name)?;
        let mut refs = self.refs.write().expect("lock poisoned");
        refs.insert(name.to_string(), *target);
        Ok(())
    }

    fn compare_and_swap(
        &self,
        name: &str,
        expected: Option<&ObjectId>,
        new: &ObjectId,
    ) -> Result<bool> {
        validate_ref_name(name)?;
        let mut refs = self.refs.write().expect("lock poisoned");
        if refs.get(name) != expected {
            return Ok(false);
        }
        refs.insert(name.to_string(), *new);
        Ok(true)
    }

    fn delete_ref(&self, name: &str) -> Result<bool> {
        let mut refs = self.refs.write().expect("lock poisoned");
        Ok(refs.remove(name).is_some())
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(String, ObjectId)>> {
        let refs = self.refs.read().expect("lock poisoned");
        Ok(refs
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), *v))
            .collect())
    }
}
