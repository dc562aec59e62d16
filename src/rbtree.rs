use std::{cmp::Ordering, mem};

use log::{debug, error, trace};
use rand::Rng;

use crate::arena::{Arena, NodeId};
use crate::depth::Depth;
use crate::error::Error;
use crate::key::{Comparator, Key};

// Initial capacity for traversal worklists, enough for a tree of
// 2^32 entries without reallocating.
const STACK_HINT: usize = 64;

/// RbTree manage a single instance of in-memory index using
/// [red-black][rbt] tree, keyed by opaque byte strings.
///
/// Keys are copied into the tree on insert and ordered by the
/// [`Comparator`] supplied at construction. Values are owned by the
/// tree until they are removed, or handed to a destroyer callback.
///
/// [rbt]: https://en.wikipedia.org/wiki/Red%E2%80%93black_tree
#[derive(Clone)]
pub struct RbTree<V, C>
where
    C: Comparator,
{
    name: String,
    nodes: Arena<Node<V>>,
    root: Option<NodeId>,
    n_count: usize, // number of entries in the tree.
    comparator: C,
}

/// Different ways to construct a new RbTree instance.
impl<V, C> RbTree<V, C>
where
    C: Comparator,
{
    /// Create an empty instance of RbTree, identified by `name` and
    /// ordered by `comparator`. Applications can choose unique names.
    pub fn new<S>(name: S, comparator: C) -> RbTree<V, C>
    where
        S: AsRef<str>,
    {
        RbTree {
            name: name.as_ref().to_string(),
            nodes: Arena::new(),
            root: Default::default(),
            n_count: Default::default(),
            comparator,
        }
    }

    /// Create a new instance of RbTree and load it with entries from
    /// `iter`. When the same key appears more than once the last value
    /// wins.
    pub fn load_from<S, I, K>(name: S, comparator: C, iter: I) -> Result<RbTree<V, C>, Error>
    where
        S: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[u8]>,
    {
        let mut tree = RbTree::new(name, comparator);
        for (key, value) in iter {
            tree.insert(key.as_ref(), value)?;
        }
        debug!("{}: loaded {} entries", tree.name, tree.n_count);
        Ok(tree)
    }
}

/// Maintenance API.
impl<V, C> RbTree<V, C>
where
    C: Comparator,
{
    /// Identify this instance. Applications can choose unique names while
    /// creating RbTree instances.
    #[inline]
    pub fn id(&self) -> String {
        self.name.clone()
    }

    /// Return number of entries in this instance.
    #[inline]
    pub fn len(&self) -> usize {
        self.n_count
    }

    /// Check whether this index is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_count == 0
    }

    /// Return quickly with basic statisics, only entries() method is valid
    /// with this statisics.
    pub fn stats(&self) -> Stats {
        Stats::new(self.n_count, mem::size_of::<Node<V>>())
    }

    /// Validate red-black tree with following rules:
    ///
    /// * Root node is black.
    /// * From root to any leaf, no consecutive reds allowed in its path.
    /// * Number of blacks should be same under left child and right child.
    /// * Every child points back to its parent.
    /// * Make sure keys are in sorted order.
    /// * Number of reachable nodes equals [`RbTree::len`].
    ///
    /// Additionally return full statistics on the tree. Refer to [`Stats`]
    /// for more information.
    pub fn validate(&self) -> Result<Stats, Error> {
        if self.is_red(self.root) {
            return Err(Error::RedRoot);
        }
        if let Some(root) = self.root {
            if let Some(parent) = self.node(root).parent {
                let msg = format!("root {:?} has parent {:?}", root, parent);
                return Err(Error::BrokenLink(msg));
            }
        }

        let mut stats = Stats::new(self.n_count, mem::size_of::<Node<V>>());
        stats.set_depths(Depth::new());
        let mut n_nodes = 0;
        let blacks = self.validate_tree(self.root, false, 0, 0, &mut n_nodes, &mut stats)?;
        if n_nodes != self.n_count {
            return Err(Error::SizeMismatch(self.n_count, n_nodes));
        } else if self.nodes.len() != self.n_count {
            // slots leaked by a splice that did not free its node.
            return Err(Error::SizeMismatch(self.n_count, self.nodes.len()));
        }

        let mut iter = self.iter();
        if let Some((mut prev, _)) = iter.next() {
            for (key, _) in iter {
                if !self.comparator.less(prev, key) {
                    return Err(Error::SortError(key.to_vec(), prev.to_vec()));
                }
                prev = key;
            }
        }

        stats.set_blacks(blacks);
        Ok(stats)
    }
}

/// Write operations on RbTree instance.
impl<V, C> RbTree<V, C>
where
    C: Comparator,
{
    /// Set value for key. Return `Ok(true)` when a new entry was created
    /// and `Ok(false)` when an existing entry's value was overwritten.
    ///
    /// Key bytes are copied into the tree. If the copy or the node cannot
    /// be allocated, return [`Error::AllocFailed`] and leave the tree
    /// as it was; `value` is dropped in that case.
    pub fn insert(&mut self, key: &[u8], value: V) -> Result<bool, Error> {
        let vacant = match self.search(key) {
            Search::Found(id) => {
                self.node_mut(id).value = value;
                return Ok(false);
            }
            Search::Vacant(vacant) => vacant,
        };

        let key = Key::try_copy(key).map_err(|err| {
            error!("{}: insert, {}", self.name, err);
            err
        })?;
        let parent = vacant.map(|(parent, _)| parent);
        let id = self.nodes.try_alloc(Node::new(key, value, parent)).map_err(|err| {
            error!("{}: insert, {}", self.name, err);
            err
        })?;

        match vacant {
            None => {
                self.node_mut(id).color = Color::Black;
                self.root = Some(id);
            }
            Some((parent, side)) => {
                *self.node_mut(parent).child_mut(side) = Some(id);
                if self.is_red(Some(parent)) {
                    self.insert_fixup(id);
                }
            }
        }
        self.n_count += 1;
        Ok(true)
    }

    /// Delete key from this instance and return its value. If key is
    /// not present, then remove is effectively a no-op.
    pub fn remove(&mut self, key: &[u8]) -> Option<V> {
        match self.search(key) {
            Search::Found(id) => {
                let node = self.do_remove(id);
                self.n_count -= 1;
                if self.n_count == 0 {
                    // hand back slots left on the free list.
                    self.nodes.clear();
                }
                Some(node.value)
            }
            Search::Vacant(_) => None,
        }
    }

    /// Same as [`RbTree::remove`], but the removed value is handed to
    /// `destroyer`. Return whether key was present.
    pub fn remove_and_destroy<F>(&mut self, key: &[u8], destroyer: F) -> bool
    where
        F: FnOnce(V),
    {
        match self.remove(key) {
            Some(value) => {
                destroyer(value);
                true
            }
            None => false,
        }
    }

    /// Remove all entries, dropping their values.
    pub fn clear(&mut self) {
        self.clear_and_destroy_elements(mem::drop)
    }

    /// Remove all entries, children before parents, handing each value
    /// to `destroyer`.
    pub fn clear_and_destroy_elements<F>(&mut self, mut destroyer: F)
    where
        F: FnMut(V),
    {
        debug!("{}: clearing {} entries", self.name, self.n_count);

        // (self, right, left) order, which read backwards is post-order.
        let mut order: Vec<NodeId> = Vec::with_capacity(self.n_count);
        let mut stack: Vec<NodeId> = Vec::with_capacity(STACK_HINT);
        stack.extend(self.root);
        while let Some(id) = stack.pop() {
            order.push(id);
            let node = self.node(id);
            stack.extend(node.left);
            stack.extend(node.right);
        }
        for id in order.into_iter().rev() {
            destroyer(self.nodes.take(id).value);
        }

        self.nodes.clear();
        self.root = None;
        self.n_count = 0;
    }

    /// Consume this instance, dropping all values.
    pub fn destroy(mut self) {
        debug!("{}: destroy", self.name);
        self.clear()
    }

    /// Consume this instance, handing every value to `destroyer`.
    pub fn destroy_and_destroy_elements<F>(mut self, destroyer: F)
    where
        F: FnMut(V),
    {
        debug!("{}: destroy", self.name);
        self.clear_and_destroy_elements(destroyer)
    }
}

/// Read operations on RbTree instance.
impl<V, C> RbTree<V, C>
where
    C: Comparator,
{
    /// Get the value for key.
    pub fn find(&self, key: &[u8]) -> Option<&V> {
        match self.search(key) {
            Search::Found(id) => Some(&self.node(id).value),
            Search::Vacant(_) => None,
        }
    }

    /// Get a mutable reference to the value for key.
    pub fn find_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        match self.search(key) {
            Search::Found(id) => Some(&mut self.node_mut(id).value),
            Search::Vacant(_) => None,
        }
    }

    /// Return a random entry from this index.
    pub fn random<R: Rng>(&self, rng: &mut R) -> Option<(&[u8], &V)> {
        let mut node = self.node(self.root?);

        let mut at_depth = rng.gen::<u8>() % 40;
        loop {
            let next = match rng.gen::<u8>() % 2 {
                0 => node.left,
                1 => node.right,
                _ => unreachable!(),
            };
            match next {
                Some(next) if at_depth > 0 => {
                    at_depth -= 1;
                    node = self.node(next);
                }
                _ => break Some((node.key.as_bytes(), &node.value)),
            }
        }
    }

    /// Return an iterator over all entries in this instance, in key order.
    pub fn iter(&self) -> Iter<V> {
        let mut iter = Iter {
            nodes: &self.nodes,
            stack: Vec::with_capacity(STACK_HINT),
        };
        iter.push_left(self.root);
        iter
    }

    /// Return an iterator visiting each node before its left subtree,
    /// and the left subtree before the right.
    pub fn preorder(&self) -> Preorder<V> {
        let mut stack = Vec::with_capacity(STACK_HINT);
        stack.extend(self.root);
        Preorder {
            nodes: &self.nodes,
            stack,
        }
    }

    /// Call `visitor` for every entry in preorder. `visitor` must not
    /// mutate this tree.
    pub fn iterate_preorder<F>(&self, mut visitor: F)
    where
        F: FnMut(&[u8], &V),
    {
        for (key, value) in self.preorder() {
            visitor(key, value)
        }
    }
}

impl<'a, V, C> IntoIterator for &'a RbTree<V, C>
where
    C: Comparator,
{
    type Item = (&'a [u8], &'a V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Iter<'a, V> {
        self.iter()
    }
}

enum Search {
    Found(NodeId),
    // parent and side to hang a new node, None when the tree is empty.
    Vacant(Option<(NodeId, Side)>),
}

impl<V, C> RbTree<V, C>
where
    C: Comparator,
{
    fn search(&self, key: &[u8]) -> Search {
        let mut vacant = None;
        let mut next = self.root;
        while let Some(id) = next {
            let node = self.node(id);
            let side = match self.comparator.compare(key, &node.key) {
                Ordering::Less => Side::Left,
                Ordering::Greater => Side::Right,
                Ordering::Equal => return Search::Found(id),
            };
            vacant = Some((id, side));
            next = node.child(side);
        }
        Search::Vacant(vacant)
    }

    // Loop while `node` and its parent are both red.
    fn insert_fixup(&mut self, mut node: NodeId) {
        trace!("{}: insert_fixup at {:?}", self.name, node);

        while let Some(mut parent) = self.parent(node) {
            if self.is_black(Some(parent)) {
                break;
            }
            let grand = match self.parent(parent) {
                Some(grand) => grand,
                None => panic!("insert_fixup(): red root ? Call the programmer"),
            };
            let side = self.side_of(parent, grand);
            let uncle = self.node(grand).child(side.flip());

            if let Some(uncle) = uncle.filter(|u| self.is_red(Some(*u))) {
                self.node_mut(parent).color = Color::Black;
                self.node_mut(uncle).color = Color::Black;
                self.node_mut(grand).color = Color::Red;
                node = grand;
                continue;
            }

            if self.side_of(node, parent) != side {
                // inner grandchild, straighten it into an outer one.
                self.rotate(parent, side);
                node = parent;
                parent = self.parent(node).expect("insert_fixup(): lost parent");
            }
            self.node_mut(parent).color = Color::Black;
            self.node_mut(grand).color = Color::Red;
            self.rotate(grand, side.flip());
        }

        if let Some(root) = self.root {
            self.node_mut(root).color = Color::Black;
        }
    }

    fn do_remove(&mut self, id: NodeId) -> Node<V> {
        let node = self.node(id);
        let target = match (node.left, node.right) {
            (Some(_), Some(right)) => {
                // promote the successor's entry into this node, and splice
                // out the successor carrying the entry being removed.
                let succ = self.leftmost(right);
                let (node, succ_node) = self.nodes.get2_mut(id, succ);
                mem::swap(&mut node.key, &mut succ_node.key);
                mem::swap(&mut node.value, &mut succ_node.value);
                succ
            }
            _ => id,
        };
        self.splice(target)
    }

    // Unlink a node that has at most one child.
    fn splice(&mut self, id: NodeId) -> Node<V> {
        let (child, parent, color) = {
            let node = self.node(id);
            (node.left.or(node.right), node.parent, node.color)
        };
        if let Some(child) = child {
            self.node_mut(child).parent = parent;
        }
        self.replace_child(parent, id, child);
        let node = self.nodes.take(id);

        if color == Color::Black {
            self.remove_fixup(child, parent);
        }
        node
    }

    // `node` is short of one black compared to its sibling subtree.
    fn remove_fixup(&mut self, mut node: Option<NodeId>, mut parent: Option<NodeId>) {
        trace!("{}: remove_fixup at {:?}", self.name, node);

        while node != self.root && self.is_black(node) {
            let p = match parent {
                Some(p) => p,
                None => break,
            };
            let side = match node {
                Some(id) => self.side_of(id, p),
                None if self.node(p).left.is_none() => Side::Left,
                None => Side::Right,
            };

            let mut sibling = self.sibling(p, side);
            if self.is_red(Some(sibling)) {
                self.node_mut(sibling).color = Color::Black;
                self.node_mut(p).color = Color::Red;
                self.rotate(p, side);
                sibling = self.sibling(p, side);
            }

            let (near, far) = {
                let s = self.node(sibling);
                (s.child(side), s.child(side.flip()))
            };
            if self.is_black(near) && self.is_black(far) {
                self.node_mut(sibling).color = Color::Red;
                node = Some(p);
                parent = self.parent(p);
                continue;
            }

            if self.is_black(far) {
                let near = near.expect("remove_fixup(): red near child vanished");
                self.node_mut(near).color = Color::Black;
                self.node_mut(sibling).color = Color::Red;
                self.rotate(sibling, side.flip());
                sibling = self.sibling(p, side);
            }

            let far = self.node(sibling).child(side.flip());
            let far = far.expect("remove_fixup(): red far child vanished");
            let color = self.node(p).color;
            self.node_mut(sibling).color = color;
            self.node_mut(p).color = Color::Black;
            self.node_mut(far).color = Color::Black;
            self.rotate(p, side);
            node = self.root;
            parent = None;
        }

        if let Some(node) = node {
            self.node_mut(node).color = Color::Black;
        }
    }

    //              (p)                       (p)
    //               |                         |
    //              node                       x
    //              /  \                      / \
    //             /    \                    /   \
    //            /      \                  /     \
    //          left      x              node      xr
    //                   / \             /  \
    //                 xl   xr        left   xl
    //
    // Above is rotate(node, Side::Left), Side::Right is the mirror. The
    // root is forced black after every rotation, not just at the end of
    // a fixup.
    fn rotate(&mut self, node: NodeId, dir: Side) {
        trace!("{}: rotate {:?} at {:?}", self.name, dir, node);

        let x = match self.node(node).child(dir.flip()) {
            Some(x) => x,
            None => panic!("rotate(): missing pivot child ? Call the programmer"),
        };
        let inner = self.node(x).child(dir);
        *self.node_mut(node).child_mut(dir.flip()) = inner;
        if let Some(inner) = inner {
            self.node_mut(inner).parent = Some(node);
        }

        let parent = self.node(node).parent;
        self.node_mut(x).parent = parent;
        self.replace_child(parent, node, Some(x));

        *self.node_mut(x).child_mut(dir) = Some(node);
        self.node_mut(node).parent = Some(x);

        if let Some(root) = self.root {
            self.node_mut(root).color = Color::Black;
        }

        #[cfg(test)]
        self.check_rotation(node, x, dir);
    }

    fn validate_tree(
        &self,
        id: Option<NodeId>,
        fromred: bool,
        mut nb: usize,
        depth: usize,
        n_nodes: &mut usize,
        stats: &mut Stats,
    ) -> Result<usize, Error> {
        let id = match id {
            None => {
                if let Some(depths) = stats.depths.as_mut() {
                    depths.sample(depth);
                }
                return Ok(nb);
            }
            Some(id) => id,
        };
        *n_nodes += 1;

        let red = self.is_red(Some(id));
        if fromred && red {
            return Err(Error::ConsecutiveReds);
        }
        if !red {
            nb += 1;
        }

        let node = self.node(id);
        for child in node.left.iter().chain(node.right.iter()) {
            let back = self.node(*child).parent;
            if back != Some(id) {
                let msg = format!("child {:?} of {:?} points to {:?}", child, id, back);
                return Err(Error::BrokenLink(msg));
            }
        }

        let lblacks = self.validate_tree(node.left, red, nb, depth + 1, n_nodes, stats)?;
        let rblacks = self.validate_tree(node.right, red, nb, depth + 1, n_nodes, stats)?;
        if lblacks != rblacks {
            let err = format!("left: {} right: {}", lblacks, rblacks);
            return Err(Error::UnbalancedBlacks(err));
        }
        Ok(lblacks)
    }

    fn leftmost(&self, mut id: NodeId) -> NodeId {
        while let Some(left) = self.node(id).left {
            id = left
        }
        id
    }

    fn sibling(&self, parent: NodeId, side: Side) -> NodeId {
        match self.node(parent).child(side.flip()) {
            Some(sibling) => sibling,
            None => panic!("sibling(): black-height deficit without sibling"),
        }
    }

    // Point `parent`'s link to `old` at `new`, or the root when `parent`
    // is None.
    fn replace_child(&mut self, parent: Option<NodeId>, old: NodeId, new: Option<NodeId>) {
        match parent {
            None => self.root = new,
            Some(parent) => {
                let side = self.side_of(old, parent);
                *self.node_mut(parent).child_mut(side) = new;
            }
        }
    }

    #[inline]
    fn side_of(&self, child: NodeId, parent: NodeId) -> Side {
        if self.node(parent).left == Some(child) {
            Side::Left
        } else {
            Side::Right
        }
    }

    #[inline]
    fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    #[inline]
    fn is_red(&self, id: Option<NodeId>) -> bool {
        id.map_or(false, |id| self.node(id).color == Color::Red)
    }

    #[inline]
    fn is_black(&self, id: Option<NodeId>) -> bool {
        !self.is_red(id)
    }

    #[inline]
    fn node(&self, id: NodeId) -> &Node<V> {
        self.nodes.get(id)
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> &mut Node<V> {
        self.nodes.get_mut(id)
    }
}

/// In-order iterator over [`RbTree`] entries.
pub struct Iter<'a, V> {
    nodes: &'a Arena<Node<V>>,
    stack: Vec<NodeId>,
}

impl<'a, V> Iter<'a, V> {
    fn push_left(&mut self, mut next: Option<NodeId>) {
        while let Some(id) = next {
            self.stack.push(id);
            next = self.nodes.get(id).left;
        }
    }
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a [u8], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let nodes = self.nodes;
        let node = nodes.get(self.stack.pop()?);
        self.push_left(node.right);
        Some((node.key.as_bytes(), &node.value))
    }
}

/// Preorder iterator over [`RbTree`] entries, node then left subtree
/// then right subtree.
pub struct Preorder<'a, V> {
    nodes: &'a Arena<Node<V>>,
    stack: Vec<NodeId>,
}

impl<'a, V> Iterator for Preorder<'a, V> {
    type Item = (&'a [u8], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let nodes = self.nodes;
        let node = nodes.get(self.stack.pop()?);
        self.stack.extend(node.right);
        self.stack.extend(node.left);
        Some((node.key.as_bytes(), &node.value))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Color {
    Red,
    Black,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Side {
    Left,
    Right,
}

impl Side {
    #[inline]
    fn flip(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Node corresponds to a single entry in RbTree instance.
#[derive(Clone)]
struct Node<V> {
    key: Key,
    value: V,
    color: Color,
    left: Option<NodeId>,   // store: left child
    right: Option<NodeId>,  // store: right child
    parent: Option<NodeId>, // back-link, navigation only
}

impl<V> Node<V> {
    // new nodes are always red.
    fn new(key: Key, value: V, parent: Option<NodeId>) -> Node<V> {
        Node {
            key,
            value,
            color: Color::Red,
            left: None,
            right: None,
            parent,
        }
    }

    #[inline]
    fn child(&self, side: Side) -> Option<NodeId> {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    #[inline]
    fn child_mut(&mut self, side: Side) -> &mut Option<NodeId> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

/// Statistics on [`RbTree`]. Serves two purpose:
///
/// * To get partial but quick statistics via [`RbTree::stats`] method.
/// * To get full statisics via [`RbTree::validate`] method.
#[derive(Default, Debug)]
pub struct Stats {
    entries: usize, // number of entries in the tree.
    node_size: usize,
    blacks: Option<usize>,
    depths: Option<Depth>,
}

impl Stats {
    fn new(entries: usize, node_size: usize) -> Stats {
        Stats {
            entries,
            node_size,
            blacks: Default::default(),
            depths: Default::default(),
        }
    }

    #[inline]
    fn set_blacks(&mut self, blacks: usize) {
        self.blacks = Some(blacks)
    }

    #[inline]
    fn set_depths(&mut self, depths: Depth) {
        self.depths = Some(depths)
    }

    /// Return number entries in [`RbTree`] instance.
    #[inline]
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Return node-size, including over-head for `RbTree<V, C>`. Key
    /// bytes live in a separate allocation and are not counted.
    #[inline]
    pub fn node_size(&self) -> usize {
        self.node_size
    }

    /// Return number of black nodes from root to leaf, on both left
    /// and right child.
    #[inline]
    pub fn blacks(&self) -> Option<usize> {
        self.blacks
    }

    /// Return [`Depth`] statistics.
    pub fn depths(&self) -> Option<Depth> {
        match self.depths.as_ref() {
            Some(depths) if depths.samples() > 0 => Some(depths.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "rbtree_test.rs"]
mod rbtree_test;
