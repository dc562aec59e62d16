/// Can be used while indexing keys without values, like ``RbTree<Empty, C>``.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord)]
pub struct Empty {}
