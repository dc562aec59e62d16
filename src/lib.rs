//! Ordered key/value index over opaque byte keys, implemented as a
//! red-black tree.
//!
//! ```
//! use rbt_index::{ByteOrder, RbTree};
//!
//! let mut index: RbTree<&str, _> = RbTree::new("users", ByteOrder);
//! assert_eq!(index.insert(b"jorge", "admin"), Ok(true));
//! assert_eq!(index.insert(b"jorge", "guest"), Ok(false));
//! assert_eq!(index.find(b"jorge"), Some(&"guest"));
//! assert_eq!(index.remove(b"jorge"), Some("guest"));
//! assert!(index.is_empty());
//! ```
//!
//! Single threaded. Comparator, visitor and destroyer callbacks are
//! invoked synchronously and must not mutate the tree they are handed.

mod arena;
mod depth;
mod empty;
mod error;
mod key;
mod rbtree;

pub use crate::depth::Depth;
pub use crate::empty::Empty;
pub use crate::error::Error;
pub use crate::key::{ByteOrder, Comparator};
pub use crate::rbtree::{Iter, Preorder, RbTree, Stats};
