//! LRU (Least Recently Used) store
//!
//! Nodes live in an arena (`Vec` slots reused through a free list) and link to
//! each other by slot index, giving O(1) promote, insert and evict. The key
//! index maps each key to its slot.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroUsize;

use ahash::RandomState;

/// Node in the recency list
struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Outcome of [`LruCache::put`]
#[derive(Debug, PartialEq, Eq)]
pub enum Put<K, V> {
    /// New entry stored; nothing evicted
    Inserted,
    /// New entry stored; the least recently used entry was evicted
    Evicted(K, V),
    /// Key was already present; it was promoted and the new value dropped
    Promoted,
}

/// LRU store with fixed capacity
///
/// `head` is the most recently used entry, `tail` the least.
pub struct LruCache<K, V> {
    map: HashMap<K, usize, RandomState>,
    nodes: Vec<Option<Node<K, V>>>,
    head: Option<usize>,
    tail: Option<usize>,
    free_list: Vec<usize>,
    capacity: NonZeroUsize,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create a new LRU store with the given capacity
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            map: HashMap::with_capacity_and_hasher(capacity.get(), RandomState::new()),
            nodes: Vec::with_capacity(capacity.get()),
            head: None,
            tail: None,
            free_list: Vec::new(),
            capacity,
        }
    }

    /// Look up `key`, promoting it to most recently used
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        self.nodes[idx].as_ref().map(|node| &node.value)
    }

    /// Look up `key` without touching recency
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.nodes[idx].as_ref().map(|node| &node.value)
    }

    /// Whether `key` is present (does not touch recency)
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Insert `key` at the most recently used position
    ///
    /// An existing key is only promoted; its value is left as is. When a new
    /// key pushes the size past capacity, exactly one entry (the least
    /// recently used) is evicted and handed back.
    pub fn put(&mut self, key: K, value: V) -> Put<K, V> {
        if let Some(&idx) = self.map.get(&key) {
            self.move_to_front(idx);
            return Put::Promoted;
        }

        let idx = self.alloc_node();
        self.nodes[idx] = Some(Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        self.link_front(idx);
        self.map.insert(key, idx);

        if self.map.len() > self.capacity.get() {
            if let Some((key, value)) = self.pop_lru() {
                return Put::Evicted(key, value);
            }
        }
        Put::Inserted
    }

    /// Remove `key`, returning its value
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        self.free_node(idx);
        self.nodes[idx].take().map(|node| node.value)
    }

    /// Remove and return the least recently used entry
    pub fn pop_lru(&mut self) -> Option<(K, V)> {
        let tail_idx = self.tail?;
        self.unlink(tail_idx);
        self.free_node(tail_idx);
        let node = self.nodes[tail_idx].take()?;
        self.map.remove(&node.key);
        Some((node.key, node.value))
    }

    /// Most recently used key
    pub fn most_recent(&self) -> Option<&K> {
        self.head
            .and_then(|idx| self.nodes[idx].as_ref())
            .map(|node| &node.key)
    }

    /// Least recently used key
    pub fn least_recent(&self) -> Option<&K> {
        self.tail
            .and_then(|idx| self.nodes[idx].as_ref())
            .map(|node| &node.key)
    }

    /// Entries from most to least recently used
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            nodes: &self.nodes,
            cursor: self.head,
        }
    }

    /// Get the current number of entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.free_list.clear();
        self.head = None;
        self.tail = None;
    }

    fn link_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = old_head;
        }

        match old_head {
            Some(head_idx) => {
                if let Some(head) = &mut self.nodes[head_idx] {
                    head.prev = Some(idx);
                }
            }
            None => self.tail = Some(idx),
        }

        self.head = Some(idx);
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.link_front(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match &self.nodes[idx] {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = &mut self.nodes[prev_idx] {
                    prev_node.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = &mut self.nodes[next_idx] {
                    next_node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = None;
        }
    }

    fn alloc_node(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(None);
            idx
        }
    }

    fn free_node(&mut self, idx: usize) {
        self.free_list.push(idx);
    }

    /// Walk the list both ways and compare against the index
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let forward: Vec<&K> = self.iter().map(|(k, _)| k).collect();
        assert_eq!(forward.len(), self.map.len(), "list and index sizes differ");
        assert!(self.map.len() <= self.capacity.get());

        for key in &forward {
            let idx = self.map[*key];
            assert!(self.nodes[idx].as_ref().is_some_and(|n| &n.key == *key));
        }

        let mut backward = Vec::new();
        let mut cursor = self.tail;
        while let Some(idx) = cursor {
            let node = self.nodes[idx].as_ref().expect("linked slot is empty");
            backward.push(&node.key);
            cursor = node.prev;
        }
        backward.reverse();
        assert!(forward == backward, "prev/next links disagree");
        assert_eq!(self.head.is_none(), self.map.is_empty());
        assert_eq!(self.tail.is_none(), self.map.is_empty());
    }
}

/// Iterator from most to least recently used
pub struct Iter<'a, K, V> {
    nodes: &'a [Option<Node<K, V>>],
    cursor: Option<usize>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let nodes = self.nodes;
        let node = nodes[self.cursor?].as_ref()?;
        self.cursor = node.next;
        Some((&node.key, &node.value))
    }
}
