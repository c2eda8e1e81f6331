use core::pin::Pin;

use crate::{Link, Linked, RBTree, utils};

/// A cursor which provides read-only access to an [`RBTree`].
///
/// An empty cursor (pointing at no element) is how absent results are
/// reported: [`get`][Cursor::get] returns `None` and the cursor goes nowhere.
pub struct Cursor<'a, T>
where
    T: Linked + ?Sized,
{
    pub(crate) current: Link<T>,
    pub(crate) _tree: &'a RBTree<T>,
}

impl<'a, T> Cursor<'a, T>
where
    T: Linked + ?Sized,
{
    pub fn get(&self) -> Option<&'a T> {
        // SAFETY: `current` is linked into the tree we borrow, so it points at
        // a live element for at least our lifetime.
        unsafe { self.current.map(|ptr| ptr.as_ref()) }
    }

    /// Moves the cursor to the in-order successor, or empties it at the end.
    pub fn move_next(&mut self) {
        if let Some(current) = self.current {
            self.current = unsafe { utils::next(current) };
        }
    }

    /// Moves the cursor to the in-order predecessor, or empties it at the
    /// start.
    pub fn move_prev(&mut self) {
        if let Some(current) = self.current {
            self.current = unsafe { utils::prev(current) };
        }
    }

    pub fn peek_next(&self) -> Option<&'a T> {
        // SAFETY: as in `get`.
        unsafe { utils::next(self.current?).map(|ptr| ptr.as_ref()) }
    }

    pub fn peek_prev(&self) -> Option<&'a T> {
        // SAFETY: as in `get`.
        unsafe { utils::prev(self.current?).map(|ptr| ptr.as_ref()) }
    }
}

/// A cursor which provides mutable access to an [`RBTree`].
pub struct CursorMut<'a, T>
where
    T: Linked + ?Sized,
{
    pub(crate) current: Link<T>,
    pub(crate) _tree: &'a mut RBTree<T>,
}

impl<'a, T> CursorMut<'a, T>
where
    T: Linked + ?Sized,
{
    pub fn get(&self) -> Option<&T> {
        // SAFETY: as in `Cursor::get`.
        unsafe { self.current.map(|ptr| ptr.as_ref()) }
    }

    pub fn get_mut(&mut self) -> Option<Pin<&mut T>> {
        // SAFETY: the tree is borrowed mutably, and elements are pinned while
        // linked, so handing out a pinned reference is sound.
        unsafe {
            self.current
                .map(|mut ptr| Pin::new_unchecked(ptr.as_mut()))
        }
    }

    /// Moves the cursor to the in-order successor, or empties it at the end.
    pub fn move_next(&mut self) {
        if let Some(current) = self.current {
            self.current = unsafe { utils::next(current) };
        }
    }

    /// Moves the cursor to the in-order predecessor, or empties it at the
    /// start.
    pub fn move_prev(&mut self) {
        if let Some(current) = self.current {
            self.current = unsafe { utils::prev(current) };
        }
    }

    /// Unlinks the pointed-at entry from the tree, returning its owning
    /// handle and advancing the cursor to the in-order successor.
    ///
    /// Returns `None` if the cursor is empty.
    pub fn remove_current(&mut self) -> Option<T::Handle> {
        let node = self.current?;

        // SAFETY: `node` is linked into the tree we borrow. The successor is
        // read before the removal: it survives the removal untouched, while
        // `node` itself is unlinked.
        unsafe {
            self.current = utils::next(node);
            Some(self._tree.remove_internal(node))
        }
    }

    pub fn as_cursor(&self) -> Cursor<'_, T> {
        Cursor {
            current: self.current,
            _tree: self._tree,
        }
    }
}
