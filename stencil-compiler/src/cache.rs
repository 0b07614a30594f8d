//! Opt-in cache of parsed files, shared across compilations.

use std::sync::Arc;

use dashmap::DashMap;
use stencil_ast::FileNode;
use stencil_core::{Fingerprint, SourcePath, SourceUnit};
use stencil_parser::ParseError;

/// Parsed trees keyed by path and content fingerprint.
///
/// Entries are written at most once per key: when two compilations race on
/// the same file, the first tree stored is the one everybody gets. Content
/// with a given fingerprint never changes, so entries are never invalidated.
#[derive(Debug, Default)]
pub struct AstCache {
    entries: DashMap<(SourcePath, Fingerprint), Arc<FileNode>>,
}

impl AstCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, unit: &SourceUnit) -> Option<Arc<FileNode>> {
        let key = (unit.path().clone(), unit.fingerprint());
        self.entries.get(&key).map(|entry| Arc::clone(entry.value()))
    }

    /// A private copy of the tree for `unit`, parsing it on a miss.
    ///
    /// Parse failures are not cached.
    pub fn get_or_parse(&self, unit: &SourceUnit) -> Result<FileNode, Box<ParseError>> {
        let key = (unit.path().clone(), unit.fingerprint());
        if let Some(hit) = self.entries.get(&key) {
            tracing::trace!(path = %unit.path(), "ast cache hit");
            return Ok(FileNode::clone(hit.value()));
        }

        tracing::trace!(path = %unit.path(), "ast cache miss");
        let parsed = stencil_parser::parse(unit)?;
        let entry = self.entries.entry(key).or_insert_with(|| Arc::new(parsed));
        Ok(FileNode::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &str = "{namespace a}{template .t}hi{/template}";

    #[test]
    fn test_second_parse_hits() {
        let cache = AstCache::new();
        let unit = SourceUnit::new("a.st", SRC);

        let first = cache.get_or_parse(&unit).unwrap();
        let second = cache.get_or_parse(&unit).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(first, second);
        assert!(cache.get(&unit).is_some());
    }

    #[test]
    fn test_keyed_by_path_and_content() {
        let cache = AstCache::new();
        cache.get_or_parse(&SourceUnit::new("a.st", SRC)).unwrap();
        cache.get_or_parse(&SourceUnit::new("b.st", SRC)).unwrap();
        cache
            .get_or_parse(&SourceUnit::new("a.st", "{namespace a}{template .t}bye{/template}"))
            .unwrap();
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_failures_not_cached() {
        let cache = AstCache::new();
        assert!(cache.get_or_parse(&SourceUnit::new("a.st", "{template")).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_shared_across_threads() {
        let cache = Arc::new(AstCache::new());
        let unit = SourceUnit::new("a.st", SRC);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let unit = unit.clone();
                std::thread::spawn(move || cache.get_or_parse(&unit).unwrap())
            })
            .collect();
        let trees: Vec<FileNode> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(cache.len(), 1);
        assert!(trees.windows(2).all(|pair| pair[0] == pair[1]));
    }
}
