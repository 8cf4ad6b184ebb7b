//! Byte-wise prefix trie for rule storage
//!
//! Strings sharing a common prefix hang off a common node, so resolving the
//! most specific rule for a tag is a single walk down the tree: `O(|tag|)`
//! with `O(1)` work per byte.

use std::collections::BTreeMap;

/// A prefix trie whose nodes may be decorated with a value.
///
/// The empty prefix is always decorated (the `default` handed to [`Trie::new`]),
/// which makes [`Trie::lookup`] total: the worst case is falling off the root
/// and getting the default back.
#[derive(Debug, Clone)]
pub struct Trie<V> {
    default: V,
    root: Node<V>,
}

#[derive(Debug, Clone)]
struct Node<V> {
    value: Option<V>,
    children: BTreeMap<u8, Node<V>>,
}

impl<V> Default for Node<V> {
    fn default() -> Self {
        Self {
            value: None,
            children: BTreeMap::new(),
        }
    }
}

impl<V> Trie<V> {
    /// Create a trie decorated at the empty prefix with `default`.
    pub fn new(default: V) -> Self {
        Self {
            default,
            root: Node::default(),
        }
    }

    /// Insert `value` at `prefix`, replacing any existing decoration.
    ///
    /// Matching is byte-wise; inserting the empty prefix overrides the
    /// default decoration.
    pub fn insert(&mut self, prefix: &str, value: V) {
        let mut node = &mut self.root;
        for &byte in prefix.as_bytes() {
            node = node.children.entry(byte).or_default();
        }
        node.value = Some(value);
    }

    /// Return the deepest decoration on the path spelled by `key`.
    ///
    /// The walk stops at the first byte with no matching edge. Because the
    /// empty prefix is always decorated, this never fails: a key matching no
    /// installed prefix resolves to the default.
    pub fn lookup(&self, key: &str) -> &V {
        let mut node = &self.root;
        let mut best = node.value.as_ref().unwrap_or(&self.default);

        for &byte in key.as_bytes() {
            match node.children.get(&byte) {
                Some(next) => {
                    node = next;
                    if let Some(value) = node.value.as_ref() {
                        best = value;
                    }
                }
                None => break,
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_trie_returns_default() {
        let trie: Trie<i32> = Trie::new(7);
        assert_eq!(*trie.lookup(""), 7);
        assert_eq!(*trie.lookup("anything"), 7);
    }

    #[test]
    fn longest_prefix_wins() {
        let mut trie = Trie::new(0);
        trie.insert("1-", 1);
        trie.insert("1-206-", 2);
        trie.insert("1-206-456", 3);

        assert_eq!(*trie.lookup("1-206-456-1234"), 3);
        assert_eq!(*trie.lookup("1-206-789-0123"), 2);
        assert_eq!(*trie.lookup("1-415-789-0123"), 1);
        assert_eq!(*trie.lookup("44-20-7946"), 0);
    }

    #[test]
    fn insert_replaces_silently() {
        let mut trie = Trie::new(0);
        trie.insert("abc", 1);
        trie.insert("abc", 2);
        assert_eq!(*trie.lookup("abcdef"), 2);
    }

    #[test]
    fn empty_prefix_overrides_default() {
        let mut trie = Trie::new(0);
        trie.insert("", 9);
        assert_eq!(*trie.lookup("unmatched"), 9);
    }

    #[test]
    fn partial_match_stops_at_missing_edge() {
        let mut trie = Trie::new(0);
        trie.insert("192.168.", 1);

        // walks "192.16" then falls off at '7' without reaching the decoration
        assert_eq!(*trie.lookup("192.167.0.1"), 0);
        assert_eq!(*trie.lookup("192.168.0.1"), 1);
        // shorter than the installed prefix
        assert_eq!(*trie.lookup("192."), 0);
    }
}
