use depot_types::ObjectId;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g. `"depot-blob-v1"`) that is
/// prepended to every hash computation, so a blob and a tree with identical
/// bytes still get different ids.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    pub const BLOB: Self = Self {
        domain: "depot-blob-v1",
    };
    pub const TREE: Self = Self {
        domain: "depot-tree-v1",
    };
    pub const COMMIT: Self = Self {
        domain: "depot-commit-v1",
    };

    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let mut hasher = self.start();
        hasher.update(data);
        ObjectId::from_hash(*hasher.finalize().as_bytes())
    }

    /// An incremental hasher already fed the domain prefix, for content
    /// that arrives in pieces.
    pub fn start(&self) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher
    }

    /// Verify that data produces the expected id.
    pub fn verify(&self, data: &[u8], expected: &ObjectId) -> bool {
        self.hash(data) == *expected
    }

    pub fn domain(&self) -> &str {
        self.domain
    }
}
