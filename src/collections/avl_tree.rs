use parking_lot::Mutex;
use std::cmp::{max, Ordering};
use tracing::{debug, trace};

use crate::collections::List;
use crate::config::Config;
use crate::error::{Error, Result};

// Constant to represent an empty value.
const SENTINEL: u32 = 0;

// Enum representing the fields of a node.
#[derive(Copy, Clone)]
enum Register {
    Left,
    Right,
    Parent,
    Height,
}

// Enum representing the fields of the allocator.
enum Field {
    Root,
    Size,
    Capacity,
    FreeListHead,
    Sequence,
}

/// Macro to access a node.
macro_rules! node {
    ( $array:expr, $index:expr ) => {
        $array[($index - 1) as usize]
    };
}

/// Copy of a node taken while the tree lock was held.
///
/// Neighbouring nodes are referenced by key since handles are only meaningful
/// while the lock is held.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeSnapshot<V> {
    pub key: i32,
    pub value: V,
    /// Height of the subtree rooted at the node (a leaf has height 1).
    pub height: u32,
    pub parent: Option<i32>,
    pub left: Option<i32>,
    pub right: Option<i32>,
}

/// AVL tree struct, which is a self-balancing binary search tree. Values in the
/// tree are stored as such the height of two sibling subtrees differ by one at
/// most.
///
/// The tree is safe to share between threads. A single lock guards the whole
/// tree and every public operation holds it for its entire duration, so each
/// operation moves the tree from one balanced configuration to the next.
/// Values are moved in on insertion and cloned out on reads; no reference into
/// the tree outlives a call.
pub struct AvlTree<V> {
    raw: Mutex<RawTree<V>>,
}

impl<V> Default for AvlTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> AvlTree<V> {
    /// Creates an empty tree bounded only by the handle space.
    pub fn new() -> Self {
        Self::with_capacity(crate::config::MAX_CAPACITY)
    }

    /// Creates an empty tree using the specified configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - the tree configuration.
    pub fn with_config(config: Config) -> Result<Self> {
        Ok(Self::with_capacity(config.resolve_capacity()?))
    }

    fn with_capacity(capacity: u32) -> Self {
        debug!(capacity, "creating AVL tree");

        Self {
            raw: Mutex::new(RawTree::new(capacity)),
        }
    }

    /// Returns the capacity of the tree.
    pub fn capacity(&self) -> usize {
        self.raw.lock().allocator.get_field(Field::Capacity) as usize
    }

    /// Returns the number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.raw.lock().len()
    }

    /// Indicates whether the tree is full or not.
    pub fn is_full(&self) -> bool {
        self.raw.lock().is_full()
    }

    /// Indicates whether the tree is empty or not.
    pub fn is_empty(&self) -> bool {
        self.raw.lock().len() == 0
    }

    /// Returns the height of the tree (0 when empty).
    pub fn height(&self) -> u32 {
        let raw = self.raw.lock();
        raw.height(raw.allocator.get_field(Field::Root))
    }

    /// Insert a value on the tree at the specified key.
    ///
    /// When a node with the same key already exists its value is replaced and
    /// the previous value is returned. On error the tree is left unchanged.
    ///
    /// # Arguments
    ///
    /// * `key` - the key of the node.
    /// * `value` - the value of the node.
    pub fn insert(&self, key: i32, value: V) -> Result<Option<V>> {
        let previous = self.raw.lock().insert(key, value)?;
        trace!(key, replaced = previous.is_some(), "inserted");
        Ok(previous)
    }

    /// Removes the node with the specified key, returning its value.
    ///
    /// Removing a key that is not present leaves the tree untouched.
    ///
    /// # Arguments
    ///
    /// * `key` - the key of the node.
    pub fn remove(&self, key: i32) -> Option<V> {
        let removed = self.raw.lock().remove(key);
        trace!(key, found = removed.is_some(), "removed");
        removed
    }

    /// Checks whether a key is present in the tree or not.
    ///
    /// # Arguments
    ///
    /// * `key` - the key of the node.
    pub fn contains(&self, key: i32) -> bool {
        self.raw.lock().find(key) != SENTINEL
    }

    // Find the lowest entry.
    pub fn lowest(&self) -> Option<i32> {
        let raw = self.raw.lock();
        raw.key_of(raw.leftmost(raw.allocator.get_field(Field::Root)))
    }

    // Find the highest entry.
    pub fn highest(&self) -> Option<i32> {
        let raw = self.raw.lock();
        raw.key_of(raw.rightmost(raw.allocator.get_field(Field::Root)))
    }

    /// Removes every node from the tree.
    pub fn clear(&self) {
        let mut raw = self.raw.lock();
        let released = raw.len();
        raw.clear();
        debug!(released, "cleared AVL tree");
    }
}

impl<V: Clone> AvlTree<V> {
    /// Return the value under the specified key, if one is found.
    ///
    /// # Arguments
    ///
    /// * `key` - key to look up the value.
    pub fn get(&self, key: i32) -> Option<V> {
        let raw = self.raw.lock();

        match raw.find(key) {
            SENTINEL => None,
            index => node!(raw.nodes, index).value.clone(),
        }
    }

    /// Return a snapshot of the node under the specified key, if one is found.
    ///
    /// # Arguments
    ///
    /// * `key` - key to look up the node.
    pub fn lookup(&self, key: i32) -> Option<NodeSnapshot<V>> {
        let raw = self.raw.lock();
        raw.snapshot(raw.find(key))
    }

    /// Return a snapshot of the root node, if the tree is not empty.
    pub fn root(&self) -> Option<NodeSnapshot<V>> {
        let raw = self.raw.lock();
        raw.snapshot(raw.allocator.get_field(Field::Root))
    }

    /// Copies every `(key, value)` pair into a list in ascending key order.
    pub fn in_order_traversal(&self) -> List<(i32, V)> {
        self.raw.lock().in_order_traversal()
    }

    /// Merges the entries of `other` into this tree.
    ///
    /// The entries of this tree followed by the entries of `other` are reinserted
    /// into a fresh tree, so on duplicate keys the value from `other` wins. The
    /// rebuild costs O((m+n) log(m+n)). `other` is only read; it is locked just
    /// long enough to copy its entries, and the two locks are never held at the
    /// same time. If the rebuild fails this tree is left unchanged.
    ///
    /// # Arguments
    ///
    /// * `other` - the tree whose entries are merged in.
    pub fn merge(&self, other: &AvlTree<V>) -> Result<()> {
        if std::ptr::eq(self, other) {
            debug!("skipping merge of a tree into itself");
            return Ok(());
        }

        let incoming = other.in_order_traversal();

        let mut raw = self.raw.lock();
        let mut entries = raw.in_order_traversal();
        let (existing, merged) = (entries.len(), incoming.len());
        entries.merge(incoming);

        let mut rebuilt = RawTree::new(raw.allocator.get_field(Field::Capacity));

        for (key, value) in entries {
            rebuilt.insert(key, value)?;
        }

        *raw = rebuilt;
        debug!(existing, merged, len = raw.len(), "merged AVL trees");

        Ok(())
    }
}

/// Lock-free tree state.
///
/// Every method here assumes the caller already holds the tree lock, so
/// methods freely call each other without re-acquiring it.
struct RawTree<V> {
    /// Node allocator.
    allocator: Allocator,

    /// Array of nodes to store the tree.
    nodes: Vec<Node<V>>,
}

impl<V> RawTree<V> {
    fn new(capacity: u32) -> Self {
        let mut allocator = Allocator::default();
        allocator.initialize(capacity);

        Self {
            allocator,
            nodes: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.allocator.get_field(Field::Size) as usize
    }

    fn is_full(&self) -> bool {
        self.allocator.get_field(Field::Size) >= self.allocator.get_field(Field::Capacity)
    }

    fn clear(&mut self) {
        *self = RawTree::new(self.allocator.get_field(Field::Capacity));
    }

    fn insert(&mut self, key: i32, value: V) -> Result<Option<V>> {
        let root = self.allocator.get_field(Field::Root);
        let (root, previous) = self.insert_node(root, key, value)?;
        self.set_root(root);

        Ok(previous)
    }

    fn remove(&mut self, key: i32) -> Option<V> {
        let root = self.allocator.get_field(Field::Root);
        let mut removed = None;
        let root = self.delete_node(root, key, &mut removed);
        self.set_root(root);

        removed
    }

    fn find(&self, key: i32) -> u32 {
        let mut reference_node = self.allocator.get_field(Field::Root);

        while reference_node != SENTINEL {
            let current = node!(self.nodes, reference_node).key;

            reference_node = match key.cmp(&current) {
                Ordering::Less => self.register(reference_node, Register::Left),
                Ordering::Greater => self.register(reference_node, Register::Right),
                Ordering::Equal => return reference_node,
            };
        }

        SENTINEL
    }

    fn leftmost(&self, mut index: u32) -> u32 {
        while self.register(index, Register::Left) != SENTINEL {
            index = self.register(index, Register::Left);
        }
        index
    }

    fn rightmost(&self, mut index: u32) -> u32 {
        while self.register(index, Register::Right) != SENTINEL {
            index = self.register(index, Register::Right);
        }
        index
    }

    /// Reads a register of a node; the sentinel reads as zero for every register,
    /// which makes the height of an absent subtree zero.
    #[inline]
    fn register(&self, index: u32, register: Register) -> u32 {
        if index == SENTINEL {
            SENTINEL
        } else {
            node!(self.nodes, index).get_register(register)
        }
    }

    #[inline]
    fn height(&self, index: u32) -> u32 {
        self.register(index, Register::Height)
    }

    #[inline]
    fn key_of(&self, index: u32) -> Option<i32> {
        (index != SENTINEL).then(|| node!(self.nodes, index).key)
    }

    fn set_root(&mut self, root: u32) {
        self.allocator.set_field(Field::Root, root);

        if root != SENTINEL {
            node!(self.nodes, root).set_register(Register::Parent, SENTINEL);
        }
    }

    /// Inserts into the subtree rooted at `index`, returning the new subtree
    /// root and the replaced value (if the key was already present).
    ///
    /// Nothing is modified before the new node is allocated, so an allocation
    /// error leaves the subtree intact.
    fn insert_node(&mut self, index: u32, key: i32, value: V) -> Result<(u32, Option<V>)> {
        if index == SENTINEL {
            return Ok((self.add(key, value)?, None));
        }

        let branch = match key.cmp(&node!(self.nodes, index).key) {
            Ordering::Less => Register::Left,
            Ordering::Greater => Register::Right,
            Ordering::Equal => {
                let previous = node!(self.nodes, index).value.replace(value);
                return Ok((index, previous));
            }
        };

        let child = self.register(index, branch);
        let (child, previous) = self.insert_node(child, key, value)?;
        self.update_child(index, branch, child);

        Ok((self.rebalance_insert(index, key), previous))
    }

    /// Restores the AVL rule on `index` after `key` was inserted below it.
    ///
    /// The side of the new key relative to the heavy child tells apart the
    /// single and double rotation cases.
    fn rebalance_insert(&mut self, index: u32, key: i32) -> u32 {
        let balance_factor = self.balance_factor(index);

        if balance_factor > 1 {
            let left = self.register(index, Register::Left);

            if key > node!(self.nodes, left).key {
                let rotated = self.left_rotate(left);
                self.update_child(index, Register::Left, rotated);
            }
            return self.right_rotate(index);
        }

        if balance_factor < -1 {
            let right = self.register(index, Register::Right);

            if key < node!(self.nodes, right).key {
                let rotated = self.right_rotate(right);
                self.update_child(index, Register::Right, rotated);
            }
            return self.left_rotate(index);
        }

        index
    }

    /// Deletes `key` from the subtree rooted at `index`, returning the new
    /// subtree root. The removed value is stored in `removed`.
    fn delete_node(&mut self, index: u32, key: i32, removed: &mut Option<V>) -> u32 {
        if index == SENTINEL {
            return SENTINEL;
        }

        match key.cmp(&node!(self.nodes, index).key) {
            Ordering::Less => {
                let left = self.register(index, Register::Left);
                let child = self.delete_node(left, key, removed);
                self.update_child(index, Register::Left, child);
            }
            Ordering::Greater => {
                let right = self.register(index, Register::Right);
                let child = self.delete_node(right, key, removed);
                self.update_child(index, Register::Right, child);
            }
            Ordering::Equal => {
                let left = self.register(index, Register::Left);
                let right = self.register(index, Register::Right);

                if left == SENTINEL || right == SENTINEL {
                    let child = if left != SENTINEL { left } else { right };

                    if child != SENTINEL {
                        let parent = self.register(index, Register::Parent);
                        node!(self.nodes, child).set_register(Register::Parent, parent);
                    }

                    *removed = self.remove_node(index);
                    return child;
                }

                // the node keeps its slot and takes over the in-order successor's
                // entry; the successor is the one actually unlinked
                let successor = self.leftmost(right);
                let successor_key = node!(self.nodes, successor).key;
                let mut successor_value = None;

                let child = self.delete_node(right, successor_key, &mut successor_value);
                self.update_child(index, Register::Right, child);

                let node = &mut node!(self.nodes, index);
                node.key = successor_key;
                *removed = std::mem::replace(&mut node.value, successor_value);
            }
        }

        self.rebalance_delete(index)
    }

    /// Restores the AVL rule on `index` after a deletion below it.
    ///
    /// The balance of the heavy child decides between a single and a double
    /// rotation.
    fn rebalance_delete(&mut self, index: u32) -> u32 {
        let balance_factor = self.balance_factor(index);

        if balance_factor > 1 {
            let left = self.register(index, Register::Left);

            if self.balance_factor(left) < 0 {
                let rotated = self.left_rotate(left);
                self.update_child(index, Register::Left, rotated);
            }
            return self.right_rotate(index);
        }

        if balance_factor < -1 {
            let right = self.register(index, Register::Right);

            if self.balance_factor(right) > 0 {
                let rotated = self.right_rotate(right);
                self.update_child(index, Register::Right, rotated);
            }
            return self.left_rotate(index);
        }

        index
    }

    /// Adds a node to the tree.
    ///
    /// The node is only added if there is space on the tree. Slots released by
    /// removals are reused before the node array grows.
    ///
    /// # Arguments
    ///
    /// * `key` - the key of the node.
    /// * `value` - the value of the node.
    fn add(&mut self, key: i32, value: V) -> Result<u32> {
        if self.is_full() {
            return Err(Error::CapacityExceeded {
                capacity: self.allocator.get_field(Field::Capacity),
            });
        }

        let free_node = self.allocator.get_field(Field::FreeListHead);
        let sequence = self.allocator.get_field(Field::Sequence);

        if free_node == sequence {
            self.nodes.try_reserve(1)?;
            self.nodes.push(Node::new(key, value));

            self.allocator.set_field(Field::Sequence, sequence + 1);
            self.allocator.set_field(Field::FreeListHead, sequence + 1);
        } else {
            let entry = &mut node!(self.nodes, free_node);
            // the height field of a free node holds the next free node
            self.allocator
                .set_field(Field::FreeListHead, entry.get_register(Register::Height));
            entry.initialize(key, value);
        }

        self.allocator
            .set_field(Field::Size, self.allocator.get_field(Field::Size) + 1);

        Ok(free_node)
    }

    /// Calculate the balance factor of a node.
    ///
    /// The balance factor is determined by the difference between the height
    /// of its left and right children subtrees.
    ///
    /// # Arguments
    ///
    /// * `index` - index of the node.
    fn balance_factor(&self, index: u32) -> i32 {
        // safe to convert to i32 since height will be at most ~1.44 * log2(capacity)
        let left_height = self.height(self.register(index, Register::Left)) as i32;
        let right_height = self.height(self.register(index, Register::Right)) as i32;

        left_height - right_height
    }

    /// Perform a left AVL rotation.
    ///
    /// # Arguments
    ///
    /// * `index` - index of the unbalanced node.
    fn left_rotate(&mut self, index: u32) -> u32 {
        let parent = self.register(index, Register::Parent);
        let right = self.register(index, Register::Right);
        let right_left = self.register(right, Register::Left);

        self.update_child(index, Register::Right, right_left);
        self.update_child(right, Register::Left, index);
        node!(self.nodes, right).set_register(Register::Parent, parent);

        right
    }

    /// Perform a right AVL rotation.
    ///
    /// # Arguments
    ///
    /// * `index` - index of the unbalanced node.
    fn right_rotate(&mut self, index: u32) -> u32 {
        let parent = self.register(index, Register::Parent);
        let left = self.register(index, Register::Left);
        let left_right = self.register(left, Register::Right);

        self.update_child(index, Register::Left, left_right);
        self.update_child(left, Register::Right, index);
        node!(self.nodes, left).set_register(Register::Parent, parent);

        left
    }

    /// Updates the child of a parent node.
    ///
    /// This is a convenience function to update the child value of a parent node,
    /// point the child back at its new parent and trigger the [`update_height`]
    /// on the parent. This is necessary since the child node being set might be
    /// the larger subtree on its new parent node.
    ///
    /// # Arguments
    ///
    /// * `parent` - index of the parent node.
    /// * `branch` - indicates whether it is the [`Register::Left`] or [`Register::Right`] child.
    /// * `child` - index of the child node.
    #[inline]
    fn update_child(&mut self, parent: u32, branch: Register, child: u32) {
        node!(self.nodes, parent).set_register(branch, child);

        if child != SENTINEL {
            node!(self.nodes, child).set_register(Register::Parent, parent);
        }

        self.update_height(parent);
    }

    /// Updates the height of a node.
    ///
    /// The height of a node is determined by the height of the larger child's subtree plus one.
    ///
    /// # Arguments
    ///
    /// * `index` - index of the node.
    fn update_height(&mut self, index: u32) {
        let left_height = self.height(self.register(index, Register::Left));
        let right_height = self.height(self.register(index, Register::Right));

        node!(self.nodes, index).set_register(Register::Height, max(left_height, right_height) + 1);
    }

    /// Remove a node from the tree, returning its value.
    fn remove_node(&mut self, index: u32) -> Option<V> {
        if index == SENTINEL {
            return None;
        }

        let free_list_head = self.allocator.get_field(Field::FreeListHead);

        let node = &mut node!(self.nodes, index);
        let value = node.value.take();
        node.registers = [SENTINEL; 4];
        // we use the height field to create a linked list
        // of free nodes
        node.set_register(Register::Height, free_list_head);

        self.allocator.set_field(Field::FreeListHead, index);
        self.allocator
            .set_field(Field::Size, self.allocator.get_field(Field::Size) - 1);

        value
    }
}

impl<V: Clone> RawTree<V> {
    fn in_order_traversal(&self) -> List<(i32, V)> {
        let mut list = List::with_capacity(self.len());
        self.in_order(self.allocator.get_field(Field::Root), &mut list);
        list
    }

    fn in_order(&self, index: u32, list: &mut List<(i32, V)>) {
        if index == SENTINEL {
            return;
        }

        self.in_order(self.register(index, Register::Left), list);

        let node = &node!(self.nodes, index);
        if let Some(value) = &node.value {
            list.push((node.key, value.clone()));
        }

        self.in_order(self.register(index, Register::Right), list);
    }

    fn snapshot(&self, index: u32) -> Option<NodeSnapshot<V>> {
        if index == SENTINEL {
            return None;
        }

        let node = &node!(self.nodes, index);

        Some(NodeSnapshot {
            key: node.key,
            value: node.value.clone()?,
            height: node.get_register(Register::Height),
            parent: self.key_of(node.get_register(Register::Parent)),
            left: self.key_of(node.get_register(Register::Left)),
            right: self.key_of(node.get_register(Register::Right)),
        })
    }
}

/// The allocator is responsible to keep track of the status of the tree.
///
/// It uses two special fields to determine if the tree is full and to reuse
/// deleted nodes. While no node has been removed, the `sequence` has the same
/// value as the `free_list_head` field and new nodes are appended to the node
/// array. Removed nodes are pushed onto the free list and reused first.
#[derive(Clone, Copy, Default)]
struct Allocator {
    /// Allocator fields:
    ///   [0] - root
    ///   [1] - size
    ///   [2] - capacity
    ///   [3] - free_list_head
    ///   [4] - sequence
    fields: [u32; 5],
}

impl Allocator {
    fn initialize(&mut self, capacity: u32) {
        self.fields = [SENTINEL, 0, capacity, 1, 1];
    }

    #[inline(always)]
    fn get_field(&self, field: Field) -> u32 {
        self.fields[field as usize]
    }

    #[inline(always)]
    fn set_field(&mut self, field: Field, value: u32) {
        self.fields[field as usize] = value;
    }
}

struct Node<V> {
    /// Registers for a node. This is fixed to include:
    ///   [0] - left child
    ///   [1] - right child
    ///   [2] - parent
    ///   [3] - height (next free node while the node is free)
    ///
    /// Note that the index of nodes are always stored as `index + 1` to
    /// reserve the index 0 as the SENTINEL value.
    registers: [u32; 4],
    /// Node key.
    key: i32,
    /// The value associated with the node, `None` while the node is free.
    value: Option<V>,
}

impl<V> Node<V> {
    fn new(key: i32, value: V) -> Self {
        Self {
            registers: [SENTINEL, SENTINEL, SENTINEL, 1],
            key,
            value: Some(value),
        }
    }

    fn initialize(&mut self, key: i32, value: V) {
        self.registers = [SENTINEL, SENTINEL, SENTINEL, 1];
        self.key = key;
        self.value = Some(value);
    }

    #[inline(always)]
    fn get_register(&self, register: Register) -> u32 {
        self.registers[register as usize]
    }

    #[inline(always)]
    fn set_register(&mut self, register: Register, value: u32) {
        self.registers[register as usize] = value;
    }
}

#[cfg(test)]
impl<V> AvlTree<V> {
    /// Walks the whole tree asserting every structural invariant.
    pub(crate) fn validate(&self) {
        self.raw.lock().validate();
    }
}

#[cfg(test)]
impl<V> RawTree<V> {
    fn validate(&self) {
        let root = self.allocator.get_field(Field::Root);
        assert_eq!(
            self.register(root, Register::Parent),
            SENTINEL,
            "root must not have a parent"
        );

        let (_, count) = self.validate_subtree(root, None, None);
        assert_eq!(count, self.len(), "size must match the reachable nodes");
    }

    fn validate_subtree(&self, index: u32, lower: Option<i32>, upper: Option<i32>) -> (u32, usize) {
        if index == SENTINEL {
            return (0, 0);
        }

        let node = &node!(self.nodes, index);
        assert!(node.value.is_some(), "reachable node {} must hold a value", node.key);

        if let Some(lower) = lower {
            assert!(node.key > lower, "key {} out of order (lower bound {lower})", node.key);
        }
        if let Some(upper) = upper {
            assert!(node.key < upper, "key {} out of order (upper bound {upper})", node.key);
        }

        let left = node.get_register(Register::Left);
        let right = node.get_register(Register::Right);

        for child in [left, right] {
            if child != SENTINEL {
                assert_eq!(
                    self.register(child, Register::Parent),
                    index,
                    "stale parent handle below key {}",
                    node.key
                );
            }
        }

        let (left_height, left_count) = self.validate_subtree(left, lower, Some(node.key));
        let (right_height, right_count) = self.validate_subtree(right, Some(node.key), upper);

        assert!(
            (left_height as i64 - right_height as i64).abs() <= 1,
            "key {} is unbalanced ({left_height} vs {right_height})",
            node.key
        );

        let height = max(left_height, right_height) + 1;
        assert_eq!(
            node.get_register(Register::Height),
            height,
            "stale height on key {}",
            node.key
        );

        (height, left_count + right_count + 1)
    }
}
