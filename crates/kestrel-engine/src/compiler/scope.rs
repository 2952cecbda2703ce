//! Scoped hash table for name resolution
//!
//! A map from keys to values where every binding belongs to a lexical scope.
//! Scopes open and close in strict LIFO order. Inserting a key that is
//! already visible from an enclosing scope shadows it; closing the inner
//! scope makes the shadowed binding visible again.
//!
//! All bindings live in one arena owned by the table. A scope is only a
//! marker holding its depth and the head of its binding list, so nothing
//! points back at the table.

use rustc_hash::FxHashMap;
use std::hash::Hash;

/// Index of a binding in the table's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeIndex(usize);

#[derive(Debug)]
struct ScopedNode<K, V> {
    key: K,
    value: V,
    /// Depth of the scope that owns this binding (1 = outermost)
    depth: u32,
    /// Next binding introduced in the same scope
    next_in_scope: Option<NodeIndex>,
    /// Binding hidden by this one
    shadowed: Option<NodeIndex>,
}

#[derive(Debug)]
struct ScopeMarker {
    depth: u32,
    head: Option<NodeIndex>,
}

/// Handle returned by `open_scope`, consumed by `close_scope`
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a scope must be closed with close_scope"]
pub struct ScopeToken {
    depth: u32,
}

impl ScopeToken {
    pub fn depth(&self) -> u32 {
        self.depth
    }
}

/// Map with nested, shadowing scopes
#[derive(Debug)]
pub struct ScopedHashTable<K, V> {
    nodes: Vec<Option<ScopedNode<K, V>>>,
    free: Vec<usize>,
    /// Innermost visible binding per key
    visible: FxHashMap<K, NodeIndex>,
    scopes: Vec<ScopeMarker>,
}

impl<K, V> Default for ScopedHashTable<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ScopedHashTable<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            visible: FxHashMap::default(),
            scopes: Vec::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------------

    /// Open a new innermost scope
    pub fn open_scope(&mut self) -> ScopeToken {
        let depth = self.scopes.len() as u32 + 1;
        self.scopes.push(ScopeMarker { depth, head: None });
        ScopeToken { depth }
    }

    /// Close the innermost scope, evicting all of its bindings
    ///
    /// Panics if `token` does not belong to the innermost scope.
    pub fn close_scope(&mut self, token: ScopeToken) {
        let marker = self
            .scopes
            .pop()
            .expect("close_scope called with no open scope");
        assert_eq!(
            marker.depth, token.depth,
            "scopes must be closed in reverse order of opening"
        );

        let mut cursor = marker.head;
        while let Some(idx) = cursor {
            let node = self.take_node(idx);
            cursor = node.next_in_scope;
            self.restore_shadowed(node.key, node.shadowed);
        }
    }

    /// Number of open scopes
    pub fn depth(&self) -> u32 {
        self.scopes.len() as u32
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Bind `key` in the current scope
    ///
    /// Shadowing an enclosing binding is fine. Panics if `key` is already
    /// bound in the current scope (use `set_in_current_scope` for that).
    pub fn insert(&mut self, key: K, value: V) {
        let depth = self.current_depth();
        let shadowed = self.visible.get(&key).copied();
        if let Some(idx) = shadowed {
            assert!(
                self.node(idx).depth != depth,
                "insert would shadow a binding from the same scope"
            );
        }
        self.push_binding(key, value, depth, shadowed);
    }

    /// Bind `key` in the current scope, replacing a binding already there
    pub fn set_in_current_scope(&mut self, key: K, value: V) {
        let depth = self.current_depth();
        if let Some(&idx) = self.visible.get(&key) {
            if self.node(idx).depth == depth {
                self.node_mut(idx).value = value;
                return;
            }
        }
        self.insert(key, value);
    }

    /// Remove `key` if it is bound in exactly the current scope
    ///
    /// Returns false, without touching anything, when the visible binding
    /// lives in an enclosing scope or the key is unbound.
    pub fn erase_from_current_scope(&mut self, key: &K) -> bool {
        let depth = self.current_depth();
        let idx = match self.visible.get(key) {
            Some(&idx) if self.node(idx).depth == depth => idx,
            _ => return false,
        };

        // Unlink from the scope list. Linear, but scopes are small.
        let next = self.node(idx).next_in_scope;
        let mut prev: Option<NodeIndex> = None;
        let mut cursor = self.scopes.last().and_then(|s| s.head);
        while let Some(cur) = cursor {
            if cur == idx {
                break;
            }
            prev = Some(cur);
            cursor = self.node(cur).next_in_scope;
        }
        match prev {
            Some(p) => self.node_mut(p).next_in_scope = next,
            None => {
                if let Some(scope) = self.scopes.last_mut() {
                    scope.head = next;
                }
            }
        }

        let node = self.take_node(idx);
        self.restore_shadowed(node.key, node.shadowed);
        true
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Innermost visible binding of `key`
    pub fn lookup(&self, key: &K) -> Option<&V> {
        self.visible.get(key).map(|&idx| &self.node(idx).value)
    }

    /// Innermost visible binding of `key`, mutable
    pub fn lookup_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = self.visible.get(key).copied()?;
        Some(&mut self.node_mut(idx).value)
    }

    /// Innermost visible binding together with the depth of its scope
    pub fn find(&self, key: &K) -> Option<(&V, u32)> {
        self.visible.get(key).map(|&idx| {
            let node = self.node(idx);
            (&node.value, node.depth)
        })
    }

    /// Binding of `key` only if it lives in the current scope
    pub fn find_in_current_scope(&self, key: &K) -> Option<&V> {
        let depth = self.depth();
        self.visible
            .get(key)
            .map(|&idx| self.node(idx))
            .filter(|node| node.depth == depth)
            .map(|node| &node.value)
    }

    /// 1 if `key` is visible, 0 otherwise
    pub fn count(&self, key: &K) -> usize {
        usize::from(self.visible.contains_key(key))
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    /// Every visible binding, innermost scope first
    pub fn flatten(&self) -> Vec<(&K, &V)> {
        let mut result = Vec::new();
        for scope in self.scopes.iter().rev() {
            let mut cursor = scope.head;
            while let Some(idx) = cursor {
                let node = self.node(idx);
                if self.visible.get(&node.key) == Some(&idx) {
                    result.push((&node.key, &node.value));
                }
                cursor = node.next_in_scope;
            }
        }
        result
    }

    /// Keys bound in each open scope, innermost scope first
    pub fn get_keys_by_scope(&self) -> Vec<Vec<K>> {
        self.scopes
            .iter()
            .rev()
            .map(|scope| {
                let mut keys = Vec::new();
                let mut cursor = scope.head;
                while let Some(idx) = cursor {
                    let node = self.node(idx);
                    keys.push(node.key.clone());
                    cursor = node.next_in_scope;
                }
                keys
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Arena
    // ------------------------------------------------------------------------

    fn current_depth(&self) -> u32 {
        let depth = self.depth();
        assert!(depth > 0, "no scope is open");
        depth
    }

    fn push_binding(&mut self, key: K, value: V, depth: u32, shadowed: Option<NodeIndex>) {
        let next_in_scope = self.scopes.last().and_then(|s| s.head);
        let node = ScopedNode {
            key: key.clone(),
            value,
            depth,
            next_in_scope,
            shadowed,
        };
        let idx = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeIndex(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeIndex(self.nodes.len() - 1)
            }
        };
        if let Some(scope) = self.scopes.last_mut() {
            scope.head = Some(idx);
        }
        self.visible.insert(key, idx);
    }

    fn restore_shadowed(&mut self, key: K, shadowed: Option<NodeIndex>) {
        match shadowed {
            Some(prev) => {
                self.visible.insert(key, prev);
            }
            None => {
                self.visible.remove(&key);
            }
        }
    }

    fn node(&self, idx: NodeIndex) -> &ScopedNode<K, V> {
        self.nodes[idx.0].as_ref().expect("dangling scoped binding")
    }

    fn node_mut(&mut self, idx: NodeIndex) -> &mut ScopedNode<K, V> {
        self.nodes[idx.0].as_mut().expect("dangling scoped binding")
    }

    fn take_node(&mut self, idx: NodeIndex) -> ScopedNode<K, V> {
        let node = self.nodes[idx.0].take().expect("dangling scoped binding");
        self.free.push(idx.0);
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Table = ScopedHashTable<String, u32>;

    fn key(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut table = Table::new();
        let scope = table.open_scope();
        table.insert(key("a"), 1);
        assert_eq!(table.lookup(&key("a")), Some(&1));
        assert_eq!(table.count(&key("a")), 1);
        assert_eq!(table.count(&key("b")), 0);
        table.close_scope(scope);
        assert_eq!(table.lookup(&key("a")), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_shadowing_is_reversible() {
        let mut table = Table::new();
        let outer = table.open_scope();
        table.insert(key("x"), 1);
        let inner = table.open_scope();
        table.insert(key("x"), 2);
        assert_eq!(table.lookup(&key("x")), Some(&2));
        assert_eq!(table.find(&key("x")), Some((&2, 2)));
        table.close_scope(inner);
        assert_eq!(table.lookup(&key("x")), Some(&1));
        table.close_scope(outer);
        assert_eq!(table.lookup(&key("x")), None);
    }

    #[test]
    fn test_set_in_current_scope_updates_or_creates() {
        let mut table = Table::new();
        let outer = table.open_scope();
        table.insert(key("x"), 1);
        let inner = table.open_scope();
        // Not in the current scope yet: creates a shadowing binding.
        table.set_in_current_scope(key("x"), 5);
        assert_eq!(table.find_in_current_scope(&key("x")), Some(&5));
        // Already in the current scope: updates in place.
        table.set_in_current_scope(key("x"), 6);
        assert_eq!(table.lookup(&key("x")), Some(&6));
        assert_eq!(table.get_keys_by_scope()[0], vec![key("x")]);
        table.close_scope(inner);
        assert_eq!(table.lookup(&key("x")), Some(&1));
        table.close_scope(outer);
    }

    #[test]
    fn test_erase_from_current_scope() {
        let mut table = Table::new();
        let outer = table.open_scope();
        table.insert(key("x"), 1);
        let inner = table.open_scope();
        table.insert(key("x"), 2);
        table.insert(key("y"), 3);

        assert!(table.erase_from_current_scope(&key("x")));
        assert_eq!(table.lookup(&key("x")), Some(&1));
        assert_eq!(table.get_keys_by_scope()[0], vec![key("y")]);

        // The remaining binding of x lives in the outer scope.
        assert!(!table.erase_from_current_scope(&key("x")));
        assert_eq!(table.lookup(&key("x")), Some(&1));
        assert!(!table.erase_from_current_scope(&key("missing")));

        table.close_scope(inner);
        table.close_scope(outer);
    }

    #[test]
    fn test_erase_middle_of_scope_list() {
        let mut table = Table::new();
        let scope = table.open_scope();
        table.insert(key("a"), 1);
        table.insert(key("b"), 2);
        table.insert(key("c"), 3);
        assert!(table.erase_from_current_scope(&key("b")));
        assert_eq!(table.get_keys_by_scope(), vec![vec![key("c"), key("a")]]);
        table.close_scope(scope);
        assert!(table.is_empty());
    }

    #[test]
    fn test_get_keys_by_scope_innermost_first() {
        let mut table = Table::new();
        let s1 = table.open_scope();
        table.insert(key("a"), 1);
        let s2 = table.open_scope();
        table.insert(key("b"), 2);
        table.insert(key("c"), 3);
        let keys = table.get_keys_by_scope();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0], vec![key("c"), key("b")]);
        assert_eq!(keys[1], vec![key("a")]);
        table.close_scope(s2);
        table.close_scope(s1);
    }

    #[test]
    fn test_flatten_hides_shadowed() {
        let mut table = Table::new();
        let s1 = table.open_scope();
        table.insert(key("a"), 1);
        table.insert(key("b"), 2);
        let s2 = table.open_scope();
        table.insert(key("a"), 10);
        let flat = table.flatten();
        assert_eq!(flat.len(), 2);
        assert!(flat.contains(&(&key("a"), &10)));
        assert!(flat.contains(&(&key("b"), &2)));
        table.close_scope(s2);
        table.close_scope(s1);
    }

    #[test]
    fn test_arena_slots_are_reused() {
        let mut table = Table::new();
        for i in 0..10 {
            let scope = table.open_scope();
            table.insert(key("t"), i);
            table.close_scope(scope);
        }
        assert_eq!(table.nodes.len(), 1);
    }

    #[test]
    #[should_panic(expected = "same scope")]
    fn test_insert_same_scope_panics() {
        let mut table = Table::new();
        let _scope = table.open_scope();
        table.insert(key("x"), 1);
        table.insert(key("x"), 2);
    }

    #[test]
    #[should_panic(expected = "reverse order")]
    fn test_close_out_of_order_panics() {
        let mut table = Table::new();
        let outer = table.open_scope();
        let _inner = table.open_scope();
        table.close_scope(outer);
    }
}
