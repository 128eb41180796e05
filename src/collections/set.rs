use bytemuck::Pod;

use crate::collections::{AvlTree, List};
use crate::config::Config;
use crate::error::Result;

const FNV_OFFSET_64: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME_64: u64 = 0x0000_0100_0000_01b3;

/// Set of plain-old-data values stored in an [`AvlTree`].
///
/// Each value is placed under a key derived from its raw bytes (see
/// [`Set::key_of`]). Two distinct values whose derived keys collide are
/// treated as the same element.
pub struct Set<T: Pod> {
    tree: AvlTree<T>,
}

impl<T: Pod> Default for Set<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Pod> Set<T> {
    pub fn new() -> Self {
        Self {
            tree: AvlTree::new(),
        }
    }

    /// Creates an empty set using the specified configuration.
    pub fn with_config(config: Config) -> Result<Self> {
        Ok(Self {
            tree: AvlTree::with_config(config)?,
        })
    }

    /// Returns the number of values in the set.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Indicates whether the set is empty or not.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Insert a value on the set.
    ///
    /// Returns whether the value was newly inserted. Inserting a value that is
    /// already present keeps a single copy.
    ///
    /// # Arguments
    ///
    /// * `value` - the value to add.
    pub fn insert(&self, value: T) -> Result<bool> {
        Ok(self.tree.insert(Self::key_of(&value), value)?.is_none())
    }

    /// Remove a value from the set.
    ///
    /// If the value is not present in the set, this function will return `false`.
    ///
    /// # Arguments
    ///
    /// * `value` - the value to remove.
    pub fn remove(&self, value: &T) -> bool {
        self.tree.remove(Self::key_of(value)).is_some()
    }

    /// Checks whether a value is present in the set or not.
    ///
    /// # Arguments
    ///
    /// * `value` - the value to check.
    pub fn contains(&self, value: &T) -> bool {
        self.tree.contains(Self::key_of(value))
    }

    /// Adds every value of `other` to this set.
    pub fn merge(&self, other: &Set<T>) -> Result<()> {
        self.tree.merge(&other.tree)
    }

    /// Removes every value from the set.
    pub fn clear(&self) {
        self.tree.clear();
    }

    /// Copies the values into a list, ordered by their derived keys.
    pub fn to_list(&self) -> List<T> {
        self.tree
            .in_order_traversal()
            .into_iter()
            .map(|(_, value)| value)
            .collect()
    }

    /// Derives the tree key of a value.
    ///
    /// The bytes of the value are rendered as an uppercase hex string, hashed
    /// with 64-bit FNV-1a and truncated to the tree's key width.
    pub fn key_of(value: &T) -> i32 {
        let hex = hex::encode_upper(bytemuck::bytes_of(value));

        fnv1a_64(hex.as_bytes()) as i32
    }
}

fn fnv1a_64(data: &[u8]) -> u64 {
    data.iter().fold(FNV_OFFSET_64, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME_64)
    })
}

#[cfg(test)]
mod tests {
    use bytemuck::{Pod, Zeroable};

    use super::fnv1a_64;
    use crate::collections::Set;
    use crate::config::Config;
    use crate::error::Error;

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_fnv1a_reference_values() {
        assert_eq!(fnv1a_64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_key_is_stable() {
        let point = Point { x: 1, y: 2 };

        assert_eq!(Set::key_of(&point), Set::key_of(&Point { x: 1, y: 2 }));
        assert_ne!(Set::key_of(&point), Set::key_of(&Point { x: 2, y: 1 }));
    }

    #[test]
    fn test_key_hashes_uppercase_hex_of_bytes() {
        // 1u32 is laid out as 01 00 00 00 on little-endian targets
        let expected = if cfg!(target_endian = "little") {
            fnv1a_64(b"01000000")
        } else {
            fnv1a_64(b"00000001")
        };
        assert_eq!(Set::<u32>::key_of(&1), expected as i32);

        let point = Point { x: 0xAB, y: -1 };
        let expected = hex::encode_upper(bytemuck::bytes_of(&point));
        assert_eq!(Set::key_of(&point), fnv1a_64(expected.as_bytes()) as i32);
    }

    #[test]
    fn test_insert() {
        let set = Set::new();

        for i in 0..100u64 {
            assert!(set.insert(i).unwrap());
        }

        // already present
        assert!(!set.insert(42).unwrap());
        assert_eq!(set.len(), 100);

        for i in 0..100u64 {
            assert!(set.contains(&i));
        }
        assert!(!set.contains(&100));
    }

    #[test]
    fn test_remove() {
        let set = Set::new();

        set.insert(Point { x: 1, y: 1 }).unwrap();
        set.insert(Point { x: 2, y: 2 }).unwrap();

        assert!(set.remove(&Point { x: 1, y: 1 }));
        assert!(!set.remove(&Point { x: 1, y: 1 }));
        assert!(!set.contains(&Point { x: 1, y: 1 }));
        assert!(set.contains(&Point { x: 2, y: 2 }));
        assert_eq!(set.len(), 1);

        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn test_merge() {
        let set = Set::new();
        let other = Set::new();

        for i in 0..10u32 {
            set.insert(i).unwrap();
        }
        for i in 5..15u32 {
            other.insert(i).unwrap();
        }

        set.merge(&other).unwrap();

        assert_eq!(set.len(), 15);
        assert_eq!(other.len(), 10);

        let mut values: Vec<u32> = set.to_list().into_iter().collect();
        values.sort_unstable();
        assert_eq!(values, (0..15).collect::<Vec<_>>());
    }

    #[test]
    fn test_insert_when_full() {
        let set = Set::with_config(Config::with_capacity(2)).unwrap();

        set.insert(1u8).unwrap();
        set.insert(2u8).unwrap();

        assert!(matches!(set.insert(3u8), Err(Error::CapacityExceeded { .. })));
        // re-inserting a present value does not need space
        assert!(!set.insert(2u8).unwrap());
    }
}
