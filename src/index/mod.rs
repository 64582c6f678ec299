//! Disk-resident B+ tree index layer

mod cursor;
mod error;
mod key;
mod node;
mod roots;
mod tree;

#[cfg(test)]
mod tests;

pub use cursor::IndexCursor;
pub use error::{IndexError, IndexResult};
pub use key::{INDEX_KEY_SIZE, IndexKey};
pub use node::{default_internal_max_size, default_leaf_max_size};
pub use roots::{load_root, remove_root, set_root};
pub use tree::BPlusTree;
