//! Tag change notification.
//!
//! Listeners register on a [`TagPath`]. A change to tag `webapps/foo`
//! notifies listeners on `webapps/foo`, on `webapps` and on the root path.
//! Each registered path is notified at most once per installed snapshot,
//! however many tags below it changed.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

use depot_types::TagPath;

/// Receives change notifications for a path.
///
/// Called after the new snapshot is installed, outside any repository lock,
/// with the path the listener was registered on. Reading the repository
/// from inside the callback is allowed.
pub trait TagListener: Send + Sync {
    fn on_tag_change(&self, path: &TagPath);
}

impl<F> TagListener for F
where
    F: Fn(&TagPath) + Send + Sync,
{
    fn on_tag_change(&self, path: &TagPath) {
        self(path)
    }
}

/// Handle returned by registration, used to unregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Registered = Vec<(ListenerId, Arc<dyn TagListener>)>;

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<TagPath, Registered>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, path: TagPath, listener: Arc<dyn TagListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self.listeners.write().expect("lock poisoned");
        listeners.entry(path).or_default().push((id, listener));
        id
    }

    /// Returns `false` when `id` is not registered on `path`.
    pub fn remove(&self, path: &TagPath, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().expect("lock poisoned");
        let Some(registered) = listeners.get_mut(path) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|(existing, _)| *existing != id);
        let removed = registered.len() != before;
        if registered.is_empty() {
            listeners.remove(path);
        }
        removed
    }

    /// Number of registered listeners across all paths.
    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .expect("lock poisoned")
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notify listeners for every changed tag and each of its ancestors.
    /// Returns the number of callbacks made.
    pub fn notify<'a>(&self, changed: impl IntoIterator<Item = &'a TagPath>) -> usize {
        let paths: BTreeSet<TagPath> = changed
            .into_iter()
            .flat_map(TagPath::ancestors)
            .collect();

        // Snapshot the targets so callbacks run without the registry lock
        // and may register or remove listeners themselves.
        let targets: Vec<(TagPath, Arc<dyn TagListener>)> = {
            let listeners = self.listeners.read().expect("lock poisoned");
            paths
                .iter()
                .filter_map(|path| listeners.get(path).map(|r| (path, r)))
                .flat_map(|(path, registered)| {
                    registered
                        .iter()
                        .map(move |(_, listener)| (path.clone(), Arc::clone(listener)))
                })
                .collect()
        };

        for (path, listener) in &targets {
            debug!(path = %path, "notifying tag listener");
            listener.on_tag_change(path);
        }
        targets.len()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn path(s: &str) -> TagPath {
        TagPath::parse(s).unwrap()
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, Arc<dyn TagListener>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: Arc<dyn TagListener> =
            Arc::new(move |p: &TagPath| sink.lock().unwrap().push(p.as_string()));
        (seen, listener)
    }

    #[test]
    fn change_bubbles_to_ancestors() {
        let registry = ListenerRegistry::new();
        let (leaf, l) = recorder();
        registry.add(path("webapps/foo"), l);
        let (parent, l) = recorder();
        registry.add(path("webapps"), l);
        let (root, l) = recorder();
        registry.add(TagPath::root(), l);
        let (sibling, l) = recorder();
        registry.add(path("webapps/bar"), l);

        assert_eq!(registry.notify([&path("webapps/foo")]), 3);
        assert_eq!(*leaf.lock().unwrap(), ["webapps/foo"]);
        assert_eq!(*parent.lock().unwrap(), ["webapps"]);
        assert_eq!(*root.lock().unwrap(), [""]);
        assert!(sibling.lock().unwrap().is_empty());
    }

    #[test]
    fn shared_ancestors_are_notified_once() {
        let registry = ListenerRegistry::new();
        let (parent, l) = recorder();
        registry.add(path("webapps"), l);

        let changed = [path("webapps/foo"), path("webapps/bar")];
        registry.notify(changed.iter());
        assert_eq!(parent.lock().unwrap().len(), 1);
    }

    #[test]
    fn removed_listener_is_silent() {
        let registry = ListenerRegistry::new();
        let (seen, l) = recorder();
        let id = registry.add(path("a"), l);
        assert_eq!(registry.len(), 1);

        assert!(!registry.remove(&path("b"), id));
        assert!(registry.remove(&path("a"), id));
        assert!(!registry.remove(&path("a"), id));
        assert!(registry.is_empty());

        registry.notify([&path("a")]);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn ids_are_distinct() {
        let registry = ListenerRegistry::new();
        let (_, l) = recorder();
        let a = registry.add(path("a"), Arc::clone(&l));
        let b = registry.add(path("a"), l);
        assert_ne!(a, b);
        assert_eq!(registry.notify([&path("a")]), 2);
    }

    #[test]
    fn listener_may_reenter_registry() {
        let registry = Arc::new(ListenerRegistry::new());
        let inner = Arc::clone(&registry);
        registry.add(
            path("a"),
            Arc::new(move |_: &TagPath| {
                inner.add(path("b"), Arc::new(|_: &TagPath| {}));
            }),
        );
        registry.notify([&path("a")]);
        assert_eq!(registry.len(), 2);
    }
}
