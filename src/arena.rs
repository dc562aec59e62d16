#[cfg(test)]
use std::cell::Cell;

use crate::error::Error;

#[cfg(test)]
thread_local! {
    // number of allocations to let through before failing one.
    static FAIL_AFTER: Cell<Option<usize>> = Cell::new(None);
}

/// Make the allocation after the next `n` fail, on this thread only.
#[cfg(test)]
pub(crate) fn fail_alloc_after(n: usize) {
    FAIL_AFTER.with(|c| c.set(Some(n)))
}

#[cfg(test)]
pub(crate) fn alloc_fault() -> Result<(), Error> {
    FAIL_AFTER.with(|c| match c.get() {
        Some(0) => {
            c.set(None);
            Err(Error::AllocFailed("injected fault".to_string()))
        }
        Some(n) => {
            c.set(Some(n - 1));
            Ok(())
        }
        None => Ok(()),
    })
}

#[cfg(not(test))]
#[inline]
pub(crate) fn alloc_fault() -> Result<(), Error> {
    Ok(())
}

/// Handle to a slot in [`Arena`]. Handles are only meaningful for the
/// arena that issued them and are recycled after the slot is freed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct NodeId(usize);

/// Slot storage for tree nodes. Freed slots are pushed on a free list
/// and handed out again on the next alloc.
#[derive(Clone)]
pub(crate) struct Arena<T> {
    slots: Vec<Option<T>>,
    free: Vec<NodeId>,
}

impl<T> Arena<T> {
    pub(crate) fn new() -> Self {
        Arena {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Reserve room for one more element. On failure the arena is left
    /// untouched.
    pub(crate) fn try_alloc(&mut self, element: T) -> Result<NodeId, Error> {
        alloc_fault()?;
        match self.free.pop() {
            Some(id) => {
                self.slots[id.0] = Some(element);
                Ok(id)
            }
            None => {
                self.slots
                    .try_reserve(1)
                    .map_err(|err| Error::AllocFailed(err.to_string()))?;
                self.slots.push(Some(element));
                Ok(NodeId(self.slots.len() - 1))
            }
        }
    }

    #[inline]
    pub(crate) fn get(&self, id: NodeId) -> &T {
        self.slots[id.0].as_ref().expect("Arena::get(): stale handle")
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut T {
        self.slots[id.0].as_mut().expect("Arena::get_mut(): stale handle")
    }

    /// Mutable access to two distinct slots at once.
    pub(crate) fn get2_mut(&mut self, a: NodeId, b: NodeId) -> (&mut T, &mut T) {
        assert_ne!(a, b, "Arena::get2_mut(): aliasing handles");
        let (x, y) = if a.0 < b.0 {
            let (lo, hi) = self.slots.split_at_mut(b.0);
            (&mut lo[a.0], &mut hi[0])
        } else {
            let (lo, hi) = self.slots.split_at_mut(a.0);
            (&mut hi[0], &mut lo[b.0])
        };
        match (x.as_mut(), y.as_mut()) {
            (Some(x), Some(y)) => (x, y),
            _ => panic!("Arena::get2_mut(): stale handle"),
        }
    }

    pub(crate) fn take(&mut self, id: NodeId) -> T {
        let element = self.slots[id.0].take().expect("Arena::take(): stale handle");
        self.free.push(id);
        element
    }

    pub(crate) fn clear(&mut self) {
        self.slots = Vec::new();
        self.free = Vec::new();
    }

    #[cfg(test)]
    pub(crate) fn n_slots(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_reuse() {
        let mut arena: Arena<u32> = Arena::new();
        let a = arena.try_alloc(10).unwrap();
        let b = arena.try_alloc(20).unwrap();
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.take(a), 10);
        assert_eq!(arena.len(), 1);

        let c = arena.try_alloc(30).unwrap();
        assert_eq!(c, a);
        assert_eq!(*arena.get(c), 30);

        {
            let (x, y) = arena.get2_mut(b, c);
            std::mem::swap(x, y);
        }
        assert_eq!(*arena.get(b), 30);
        assert_eq!(*arena.get(c), 20);

        arena.clear();
        assert_eq!(arena.len(), 0);
        assert_eq!(arena.n_slots(), 0);
    }

    #[test]
    fn test_arena_fault() {
        let mut arena: Arena<u32> = Arena::new();
        let a = arena.try_alloc(10).unwrap();
        arena.take(a);

        fail_alloc_after(1);
        assert_eq!(arena.try_alloc(20), Ok(a));
        match arena.try_alloc(30) {
            Err(Error::AllocFailed(_)) => (),
            res => panic!("unexpected {:?}", res),
        }
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.n_slots(), 1);
        // fault is one-shot.
        assert!(arena.try_alloc(40).is_ok());
        assert_eq!(arena.len(), 2);
    }

    #[test]
    #[should_panic(expected = "stale handle")]
    fn test_arena_stale() {
        let mut arena: Arena<u32> = Arena::new();
        let a = arena.try_alloc(10).unwrap();
        arena.take(a);
        arena.get(a);
    }
}
