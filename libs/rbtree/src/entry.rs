// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::pin::Pin;
use core::ptr::NonNull;

use crate::utils::Side;
use crate::{Linked, RBTree};

/// A view into a single slot of an [`RBTree`], returned by
/// [`RBTree::entry`].
pub enum Entry<'a, T>
where
    T: Linked + ?Sized,
{
    Occupied(OccupiedEntry<'a, T>),
    Vacant(VacantEntry<'a, T>),
}

impl<'a, T> Entry<'a, T>
where
    T: Linked + ?Sized,
{
    /// Returns the linked entry, inserting the element produced by `default`
    /// first if the slot is vacant.
    pub fn or_insert_with<F>(self, default: F) -> Pin<&'a mut T>
    where
        F: FnOnce() -> T::Handle,
    {
        match self {
            // SAFETY: the node is linked into the mutably borrowed tree, and
            // elements are pinned while linked.
            Entry::Occupied(mut entry) => unsafe { Pin::new_unchecked(entry.node.as_mut()) },
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }
}

/// A view into the slot of an element that is linked into an [`RBTree`].
pub struct OccupiedEntry<'a, T>
where
    T: Linked + ?Sized,
{
    pub(crate) node: NonNull<T>,
    pub(crate) _tree: &'a mut RBTree<T>,
}

impl<T> OccupiedEntry<'_, T>
where
    T: Linked + ?Sized,
{
    pub fn get(&self) -> &T {
        // SAFETY: the node is linked into the tree we borrow.
        unsafe { self.node.as_ref() }
    }

    pub fn get_mut(&mut self) -> Pin<&mut T> {
        // SAFETY: as in `get`; elements are pinned while linked.
        unsafe { Pin::new_unchecked(self.node.as_mut()) }
    }

    /// Unlinks the entry from the tree and returns its owning handle.
    pub fn remove(self) -> T::Handle {
        // SAFETY: the node is linked into the tree we borrow mutably.
        unsafe { self._tree.remove_internal(self.node) }
    }
}

/// A view into an empty slot of an [`RBTree`], remembering where a new
/// element with the probed key would attach.
pub struct VacantEntry<'a, T>
where
    T: Linked + ?Sized,
{
    pub(crate) parent_and_side: Option<(NonNull<T>, Side)>,
    pub(crate) _tree: &'a mut RBTree<T>,
}

impl<'a, T> VacantEntry<'a, T>
where
    T: Linked + ?Sized,
{
    /// Links `element` into the remembered slot.
    ///
    /// The element's key must equal the key the entry was created with;
    /// linking a different key through a stale slot corrupts the ordering.
    ///
    /// # Panics
    ///
    /// Panics if `element` is already linked to a different intrusive
    /// collection.
    pub fn insert(self, element: T::Handle) -> Pin<&'a mut T> {
        let mut ptr = T::into_ptr(element);

        // SAFETY: `into_ptr` yields a pointer to a live element which the
        // tree now owns; the attach point was produced by the descent in
        // `RBTree::entry` over the same mutable borrow.
        unsafe {
            assert!(!T::links(ptr).as_ref().is_linked());

            match self.parent_and_side {
                Some((parent, side)) => self._tree.link_at(parent, side, ptr),
                None => self._tree.link_root(ptr),
            }

            Pin::new_unchecked(ptr.as_mut())
        }
    }
}
