use std::{error, fmt};

/// Error enumerates over all possible errors that this package
/// shall return.
#[derive(Debug, PartialEq)]
pub enum Error {
    /// Node allocation failed, the tree is left as it was before the
    /// call. The String component carries the allocator's reason.
    AllocFailed(String),
    /// Fatal case, root node is not black.
    RedRoot,
    /// Fatal case, a red node has a red child.
    ConsecutiveReds,
    /// Fatal case, black-height differs between two paths. The String
    /// component of this variant can be used for debugging.
    UnbalancedBlacks(String),
    /// Fatal case, index entries are not in sort-order. Carries the
    /// offending child key and its parent key.
    SortError(Vec<u8>, Vec<u8>),
    /// Fatal case, a parent back-link disagrees with the child links.
    BrokenLink(String),
    /// Fatal case, (counted entries, reachable nodes) disagree.
    SizeMismatch(usize, usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::AllocFailed(msg) => write!(f, "allocation failed: {}", msg),
            Error::RedRoot => write!(f, "root node is red"),
            Error::ConsecutiveReds => write!(f, "consecutive red nodes"),
            Error::UnbalancedBlacks(msg) => write!(f, "unbalanced blacks, {}", msg),
            Error::SortError(key, parent) => {
                write!(f, "key {:?} out of order under {:?}", key, parent)
            }
            Error::BrokenLink(msg) => write!(f, "broken parent link, {}", msg),
            Error::SizeMismatch(n, m) => write!(f, "size mismatch len:{} nodes:{}", n, m),
        }
    }
}

impl error::Error for Error {}
