use std::{cmp::Ordering, fmt, ops::Deref};

use crate::arena::alloc_fault;
use crate::error::Error;

/// Comparator supplies the strict less-than predicate that orders keys
/// in an [`RbTree`](crate::RbTree). Two keys are equal when neither is
/// less than the other.
///
/// Any `Fn(&[u8], &[u8]) -> bool` closure is a comparator:
///
/// ```
/// use rbt_index::RbTree;
///
/// let less = |a: &[u8], b: &[u8]| a.len() < b.len();
/// let mut index: RbTree<u32, _> = RbTree::new("by-length", less);
/// index.insert(b"abc", 3).unwrap();
/// assert_eq!(index.find(b"xyz"), Some(&3));
/// ```
///
/// Comparators are called synchronously from within tree operations and
/// must not touch the tree they are ordering.
pub trait Comparator {
    /// Return true when `a` sorts strictly before `b`.
    fn less(&self, a: &[u8], b: &[u8]) -> bool;

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        if self.less(a, b) {
            Ordering::Less
        } else if self.less(b, a) {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }
}

impl<F> Comparator for F
where
    F: Fn(&[u8], &[u8]) -> bool,
{
    #[inline]
    fn less(&self, a: &[u8], b: &[u8]) -> bool {
        self(a, b)
    }
}

/// Lexicographic byte ordering, same as comparing `&[u8]` slices.
#[derive(Clone, Copy, Debug, Default)]
pub struct ByteOrder;

impl Comparator for ByteOrder {
    #[inline]
    fn less(&self, a: &[u8], b: &[u8]) -> bool {
        a < b
    }

    #[inline]
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Key is the tree's private copy of a caller's key bytes. Once stored
/// it is never mutated, only moved between nodes.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct Key {
    bytes: Box<[u8]>,
}

impl Key {
    /// Copy `bytes` into a freshly allocated buffer, reporting allocation
    /// failure instead of aborting.
    pub(crate) fn try_copy(bytes: &[u8]) -> Result<Key, Error> {
        alloc_fault()?;
        let mut buf: Vec<u8> = Vec::new();
        buf.try_reserve_exact(bytes.len())
            .map_err(|err| Error::AllocFailed(err.to_string()))?;
        buf.extend_from_slice(bytes);
        Ok(Key {
            bytes: buf.into_boxed_slice(),
        })
    }

    #[inline]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Deref for Key {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Key{:?}", &self.bytes)
    }
}
