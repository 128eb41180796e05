//! Thread-safe in-memory containers built around a self-balancing AVL tree.
//!
//! [`AvlTree`] keeps values ordered by an `i32` key behind a single tree-wide
//! lock. [`List`] is the ordered sequence produced by in-order traversal and
//! consumed by merges, and [`Set`] stores plain-old-data values in a tree
//! keyed by a hash of their bytes.

pub mod collections;
pub mod config;
pub mod error;

#[cfg(test)]
mod proptests;

pub use collections::{AvlTree, List, NodeSnapshot, Set};
pub use config::Config;
pub use error::{Error, Result};
