//! # An intrusive Red-Black Tree.
//!
//! Red-black trees are *self-balancing binary search trees* that maintain a
//! two-color tag on every node. The coloring rules keep every root-to-leaf
//! path within a factor of two of the shortest one, which bounds the height of
//! a tree with `n` entries by `2 * log2(n + 1)` and therefore makes lookups,
//! insertions, and removals `O(log n)` in the worst case. Rebalancing after a
//! mutation touches only the nodes along one ascending path and performs at
//! most a constant number of rotations.
//!
//! This implementation is *intrusive*: node data (color and the pointers to
//! other nodes) is stored _within_ participating values, rather than being
//! allocated and owned by the tree itself.
//!
//! This crate is self-contained, fuzzed, and fully `no_std`.
//!
//! ## when to use this
//!
//! - **want binary search** - red-black trees are *sorted* collections that
//!   are efficient to search, with cheap ordered queries ([`floor`][RBTree::floor],
//!   [`ceil`][RBTree::ceil], [`min`][RBTree::min], [`max`][RBTree::max]) on top.
//! - **edit as much as you search** - the relaxed balance rule means fewer
//!   restructurings on mutation than stricter height-balanced trees.
//! - **want to avoid hidden allocations** - because node data is stored
//!   _inside_ participating values, an element can be added without requiring
//!   additional heap allocations.
//! - **have no allocator at all** - when elements have fixed memory locations
//!   (`static`s, pool slots), they can be added without *any* allocations.
//!
//! ## when not to use this
//!
//! - **need to store primitives** - intrusive collections require elements to
//!   store the node data, which excludes primitives such as strings or
//!   numbers, since they can't hold this metadata.
//! - **can't use unsafe** - both this implementation and code consuming it
//!   require `unsafe`; the `Linked` trait is unsafe to implement since it
//!   requires implementors uphold special invariants.
//!
//! ## features
//!
//! | Feature | Default | Explanation                                                                              |
//! |:--------|:--------|:-----------------------------------------------------------------------------------------|
//! | `dot`   | `false` | Enables the `RBTree::dot` method, which allows display of the tree in [graphviz format] |
//!
//! [graphviz format]: https://graphviz.org/doc/info/lang.html

#![cfg_attr(not(test), no_std)]

mod cursors;
#[cfg(feature = "dot")]
mod dot;
mod entry;
mod iter;
mod utils;

use core::borrow::Borrow;
use core::cell::UnsafeCell;
use core::cmp::Ordering;
use core::marker::PhantomPinned;
use core::ptr::NonNull;
use core::{fmt, mem};

use crate::utils::Side;

pub use crate::cursors::{Cursor, CursorMut};
#[cfg(feature = "dot")]
pub use crate::dot::Dot;
pub use crate::entry::{Entry, OccupiedEntry, VacantEntry};
pub use crate::iter::{Iter, IterMut, Postorder, Preorder};

/// Trait implemented by types which can be members of an [intrusive red-black
/// tree][RBTree].
///
/// In order to be part of an intrusive tree, a type must contain a
/// [`Links`] field that stores the color tag and the pointers to other nodes.
///
/// # Safety
///
/// This is unsafe to implement because it's the implementation's responsibility
/// to ensure that types implementing this trait are valid intrusive collection
/// nodes. In particular:
///
/// - Implementations **must** ensure that implementors are pinned in memory
///   while they are in an intrusive collection. While a given `Linked` type is
///   in an intrusive data structure, it may not be deallocated or moved to a
///   different memory location.
/// - The type implementing this trait **must not** implement [`Unpin`].
/// - Additional safety requirements for individual methods on this trait are
///   documented on those methods.
///
/// Failure to uphold these invariants will result in corruption of the
/// intrusive data structure, including dangling pointers.
///
/// # Implementing `Linked::links`
///
/// The [`Linked::links`] method provides access to a `Linked` type's `Links`
/// field through a [`NonNull`] pointer. Implementations must not go through a
/// temporary `&mut self` reference, since creating a reference to the whole
/// element asserts uniqueness over data the tree may be aliasing; project the
/// field directly from the raw pointer instead:
///
/// ```
/// use core::ptr::NonNull;
///
/// struct Entry {
///     links: rbtree::Links<Self>,
///     key: u64,
/// }
///
/// unsafe impl rbtree::Linked for Entry {
///     # type Handle = core::pin::Pin<Box<Self>>;
///     # type Key = u64;
///     # fn get_key(&self) -> &Self::Key { &self.key }
///     # fn into_ptr(handle: Self::Handle) -> NonNull<Self> {
///     #     unsafe { NonNull::from(Box::leak(core::pin::Pin::into_inner_unchecked(handle))) }
///     # }
///     # unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
///     #     core::pin::Pin::new_unchecked(Box::from_raw(ptr.as_ptr()))
///     # }
///     // ...
///
///     unsafe fn links(target: NonNull<Self>) -> NonNull<rbtree::Links<Self>> {
///         target
///             .map_addr(|addr| {
///                 let offset = core::mem::offset_of!(Self, links);
///                 addr.checked_add(offset).unwrap()
///             })
///             .cast()
///     }
/// }
/// ```
pub unsafe trait Linked {
    /// The handle owning nodes in the tree.
    ///
    /// This type must have ownership over a `Self`-typed value. When a `Handle`
    /// is dropped, it should drop the corresponding `Linked` type.
    ///
    /// A quintessential example of a `Handle` is `Pin<Box<Self>>`.
    type Handle;

    /// The type by which entries are identified and ordered.
    ///
    /// Entries are sorted by their key, so the key of an entry must not change
    /// while the entry is linked into a tree. The `Ord` bound is what makes
    /// every key comparable with every other key; an incomparable key cannot
    /// be expressed, so no operation can corrupt the ordering at runtime.
    type Key: Ord;

    /// Convert a [`Self::Handle`] to a raw pointer to `Self`, taking ownership
    /// of it in the process.
    fn into_ptr(r: Self::Handle) -> NonNull<Self>;

    /// Convert a raw pointer to `Self` into an owning [`Self::Handle`].
    ///
    /// # Safety
    ///
    /// This function is safe to call when the pointer was produced by
    /// [`Linked::into_ptr`] and still points to a valid instance of `Self`.
    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle;

    /// Return the links of the node pointed to by `ptr`.
    ///
    /// # Safety
    ///
    /// This function is safe to call when `ptr` points to a valid instance of
    /// `Self`. See [the trait-level documentation](#implementing-linkedlinks)
    /// for details on how to correctly implement this method.
    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<Self>>;

    /// Retrieve the key identifying this node within the collection.
    fn get_key(&self) -> &Self::Key;
}

pub(crate) type Link<T> = Option<NonNull<T>>;

/// Color tag of a linked node.
///
/// Absent children are treated as black leaves; they have no node to carry a
/// tag of their own.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Color {
    Red,
    Black,
}

/// An intrusive red-black tree.
///
/// This data structure supports efficient `O(log n)` lookup, insertion, and
/// removal of elements, plus ordered queries and in-order iteration.
///
/// The tree maintains the classic coloring rules: the root is black, a red
/// node never has a red child, and every path from a node down to an absent
/// leaf crosses the same number of black nodes. Together these bound the
/// height of the tree by `2 * log2(n + 1)`.
///
/// Elements are linked and unlinked in place; rotations re-wire pointers but
/// never create, destroy, or move a node.
pub struct RBTree<T>
where
    T: Linked + ?Sized,
{
    pub(crate) root: Link<T>,
    pub(crate) size: usize,
}

impl<T> Drop for RBTree<T>
where
    T: Linked + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T> Default for RBTree<T>
where
    T: Linked + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RBTree<T>
where
    T: Linked + ?Sized,
{
    /// Creates a new, empty tree.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            root: None,
            size: 0,
        }
    }

    /// Returns the number of entries in the tree.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if the tree contains no entries.
    pub fn is_empty(&self) -> bool {
        debug_assert_eq!(self.root.is_none(), self.len() == 0);
        self.len() == 0
    }

    /// Returns a `Cursor` pointing to an element with the given key.
    ///
    /// If no element with that key is in the tree the cursor is empty.
    ///
    /// The key may be any borrowed form of the entry's key type, but the
    /// ordering on the borrowed form *must* match the ordering on the key type.
    pub fn find<Q>(&self, key: &Q) -> Cursor<'_, T>
    where
        <T as Linked>::Key: Borrow<Q>,
        Q: Ord,
    {
        Cursor {
            current: unsafe { self.find_internal(key) },
            _tree: self,
        }
    }

    /// Returns a `CursorMut` pointing to an element with the given key.
    ///
    /// The key may be any borrowed form of the entry's key type, but the
    /// ordering on the borrowed form *must* match the ordering on the key type.
    pub fn find_mut<Q>(&mut self, key: &Q) -> CursorMut<'_, T>
    where
        <T as Linked>::Key: Borrow<Q>,
        Q: Ord,
    {
        CursorMut {
            current: unsafe { self.find_internal(key) },
            _tree: self,
        }
    }

    /// Returns `true` if an element with the given key is in the tree.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        <T as Linked>::Key: Borrow<Q>,
        Q: Ord,
    {
        unsafe { self.find_internal(key).is_some() }
    }

    /// Returns the entry for the given key, which is either
    /// [occupied](OccupiedEntry) or [vacant](VacantEntry).
    ///
    /// The key may be any borrowed form of the entry's key type, but the
    /// ordering on the borrowed form *must* match the ordering on the key type.
    pub fn entry<Q>(&mut self, key: &Q) -> Entry<'_, T>
    where
        <T as Linked>::Key: Borrow<Q>,
        Q: Ord,
    {
        let mut parent_and_side = None;
        let mut curr = self.root;

        while let Some(node) = curr {
            // SAFETY: all links in the tree point at live elements.
            let links = unsafe { T::links(node).as_ref() };

            let side = match key.cmp(unsafe { node.as_ref() }.get_key().borrow()) {
                Ordering::Equal => {
                    return Entry::Occupied(OccupiedEntry {
                        node,
                        _tree: self,
                    });
                }
                Ordering::Less => Side::Left,
                Ordering::Greater => Side::Right,
            };

            parent_and_side = Some((node, side));
            curr = links.child(side);
        }

        Entry::Vacant(VacantEntry {
            parent_and_side,
            _tree: self,
        })
    }

    /// Inserts a new entry into the tree.
    ///
    /// If an entry with an equal key is already linked, the tree is left
    /// untouched and the element is handed back to the caller; otherwise
    /// `None` is returned.
    ///
    /// # Panics
    ///
    /// Panics if the new entry is already linked to a different intrusive
    /// collection.
    pub fn insert(&mut self, element: T::Handle) -> Option<T::Handle> {
        let ptr = T::into_ptr(element);
        debug_assert_ne!(self.root, Some(ptr));

        // SAFETY: `into_ptr` yields a pointer to a live element which we now
        // own; all links already in the tree point at live elements.
        unsafe {
            assert!(!T::links(ptr).as_ref().is_linked());

            let Some(mut curr) = self.root else {
                self.link_root(ptr);
                return None;
            };

            let key = ptr.as_ref().get_key();

            let (parent, side) = loop {
                let curr_links = T::links(curr).as_ref();

                let side = match key.cmp(curr.as_ref().get_key()) {
                    // An equal key is already linked; hand the element back
                    // untouched.
                    Ordering::Equal => return Some(T::from_ptr(ptr)),
                    Ordering::Less => Side::Left,
                    Ordering::Greater => Side::Right,
                };

                match curr_links.child(side) {
                    Some(child) => curr = child,
                    None => break (curr, side),
                }
            };

            self.link_at(parent, side, ptr);
            None
        }
    }

    /// Removes the entry with the given key from the tree, returning the owned
    /// handle if such an entry was linked. An absent key leaves the tree
    /// untouched.
    ///
    /// The key may be any borrowed form of the entry's key type, but the
    /// ordering on the borrowed form *must* match the ordering on the key type.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<T::Handle>
    where
        <T as Linked>::Key: Borrow<Q>,
        Q: Ord,
    {
        // SAFETY: the pointer came out of `find_internal`, so it is linked
        // into this tree.
        unsafe {
            let ptr = self.find_internal(key)?;
            Some(self.remove_internal(ptr))
        }
    }

    /// Returns a cursor to the entry with the largest key not exceeding `key`,
    /// or an empty cursor if every key in the tree is greater.
    pub fn floor<Q>(&self, key: &Q) -> Cursor<'_, T>
    where
        <T as Linked>::Key: Borrow<Q>,
        Q: Ord,
    {
        let mut curr = self.root;
        let mut candidate = None;

        while let Some(node) = curr {
            // SAFETY: all links in the tree point at live elements.
            let links = unsafe { T::links(node).as_ref() };

            match key.cmp(unsafe { node.as_ref() }.get_key().borrow()) {
                Ordering::Equal => {
                    candidate = Some(node);
                    break;
                }
                Ordering::Less => curr = links.left(),
                Ordering::Greater => {
                    // This key fits; a larger one may still hide to the right.
                    candidate = Some(node);
                    curr = links.right();
                }
            }
        }

        Cursor {
            current: candidate,
            _tree: self,
        }
    }

    /// Returns a cursor to the entry with the smallest key not less than
    /// `key`, or an empty cursor if every key in the tree is smaller.
    pub fn ceil<Q>(&self, key: &Q) -> Cursor<'_, T>
    where
        <T as Linked>::Key: Borrow<Q>,
        Q: Ord,
    {
        let mut curr = self.root;
        let mut candidate = None;

        while let Some(node) = curr {
            // SAFETY: all links in the tree point at live elements.
            let links = unsafe { T::links(node).as_ref() };

            match key.cmp(unsafe { node.as_ref() }.get_key().borrow()) {
                Ordering::Equal => {
                    candidate = Some(node);
                    break;
                }
                Ordering::Greater => curr = links.right(),
                Ordering::Less => {
                    // This key fits; a smaller one may still hide to the left.
                    candidate = Some(node);
                    curr = links.left();
                }
            }
        }

        Cursor {
            current: candidate,
            _tree: self,
        }
    }

    /// Returns a cursor to the entry with the smallest key, or an empty cursor
    /// on an empty tree.
    pub fn min(&self) -> Cursor<'_, T> {
        Cursor {
            current: self.root.map(|root| unsafe { utils::find_minimum(root) }),
            _tree: self,
        }
    }

    /// Returns a cursor to the entry with the largest key, or an empty cursor
    /// on an empty tree.
    pub fn max(&self) -> Cursor<'_, T> {
        Cursor {
            current: self.root.map(|root| unsafe { utils::find_maximum(root) }),
            _tree: self,
        }
    }

    /// Gets an iterator over the entries of the tree, sorted by their key.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            head: self.root.map(|root| unsafe { utils::find_minimum(root) }),
            tail: self.root.map(|root| unsafe { utils::find_maximum(root) }),
            _tree: self,
        }
    }

    /// Gets a mutable iterator over the entries of the tree, sorted by their
    /// key.
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut {
            head: self.root.map(|root| unsafe { utils::find_minimum(root) }),
            tail: self.root.map(|root| unsafe { utils::find_maximum(root) }),
            _tree: self,
        }
    }

    /// Gets an iterator visiting the entries of the tree parent-first.
    pub fn preorder(&self) -> Preorder<'_, T> {
        Preorder {
            next: self.root,
            _tree: self,
        }
    }

    /// Gets an iterator visiting the entries of the tree children-first.
    pub fn postorder(&self) -> Postorder<'_, T> {
        Postorder {
            next: self.root.map(|root| unsafe { utils::find_leftmost_leaf(root) }),
            _tree: self,
        }
    }

    /// Removes all elements from the tree.
    ///
    /// This will properly unlink and drop all entries, which requires
    /// iterating through the tree.
    pub fn clear(&mut self) {
        if let Some(root) = self.root.take() {
            self.size = 0;
            self.clear_inner(root);
        }
    }

    #[allow(
        clippy::only_used_in_recursion,
        reason = "need to ensure tree is borrowed for the entire time we operate on it"
    )]
    fn clear_inner(&mut self, node: NonNull<T>) {
        // SAFETY: every node reachable from the old root is live and owned by
        // the tree until `from_ptr` reclaims it below.
        unsafe {
            let node_links = T::links(node).as_mut();
            if let Some(left) = node_links.left() {
                self.clear_inner(left);
            }
            if let Some(right) = node_links.right() {
                self.clear_inner(right);
            }
            node_links.unlink();
            drop(T::from_ptr(node));
        }
    }

    /// Walks the whole tree in `O(n)` and reports the first violated coloring
    /// or ordering rule, if any.
    ///
    /// A healthy tree after any completed [`insert`][RBTree::insert] or
    /// [`remove`][RBTree::remove] always returns `Ok(())`; the checker never
    /// repairs anything.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let Some(root) = self.root else {
            return Ok(());
        };

        // SAFETY: all links in the tree point at live elements.
        unsafe {
            let root_links = T::links(root).as_ref();
            if root_links.parent().is_some() {
                return Err(InvariantError::BrokenLink);
            }
            if root_links.color() == Color::Red {
                return Err(InvariantError::RedRoot);
            }

            Self::check_subtree(root)?;
        }

        Ok(())
    }

    /// Asserts that all tree invariants hold.
    ///
    /// # Panics
    ///
    /// Panics with the violated rule if the tree is corrupt.
    #[track_caller]
    pub fn assert_valid(&self) {
        debug_assert_eq!(self.root.is_none(), self.len() == 0);

        if let Err(err) = self.check_invariants() {
            panic!("red-black tree invariant violated: {err}");
        }
    }

    #[cfg(feature = "dot")]
    pub fn dot(&self) -> Dot<'_, T> {
        Dot { tree: self }
    }

    /// Checks coloring, ordering, and link sanity below `node`, returning the
    /// subtree's black-height.
    unsafe fn check_subtree(node: NonNull<T>) -> Result<usize, InvariantError> {
        // SAFETY: the caller guarantees `node` is linked, and all links
        // reachable from it point at live elements.
        unsafe {
            let links = T::links(node).as_ref();

            let left = Self::check_child(node, links.left(), Side::Left)?;
            let right = Self::check_child(node, links.right(), Side::Right)?;
            if left != right {
                return Err(InvariantError::BlackHeightMismatch);
            }

            Ok(left + usize::from(links.color() == Color::Black))
        }
    }

    /// Checks one child slot of `node` and descends into it.
    ///
    /// An absent child is a black leaf of black-height 1; `node` itself always
    /// exists, so only the children need the absence special case.
    unsafe fn check_child(
        node: NonNull<T>,
        child: Link<T>,
        side: Side,
    ) -> Result<usize, InvariantError> {
        let Some(child) = child else {
            return Ok(1);
        };

        // SAFETY: as in `check_subtree`.
        unsafe {
            let links = T::links(node).as_ref();
            let child_links = T::links(child).as_ref();

            if child == node || child_links.parent() != Some(node) {
                return Err(InvariantError::BrokenLink);
            }
            if links.color() == Color::Red && child_links.color() == Color::Red {
                return Err(InvariantError::RedRed);
            }

            let expected = match side {
                Side::Left => Ordering::Less,
                Side::Right => Ordering::Greater,
            };
            if child.as_ref().get_key().cmp(node.as_ref().get_key()) != expected {
                return Err(InvariantError::OrderViolation);
            }

            Self::check_subtree(child)
        }
    }

    pub(crate) unsafe fn find_internal<Q>(&self, key: &Q) -> Link<T>
    where
        <T as Linked>::Key: Borrow<Q>,
        Q: Ord,
    {
        let mut curr = self.root;

        while let Some(node) = curr {
            // SAFETY: all links in the tree point at live elements.
            let links = unsafe { T::links(node).as_ref() };

            match key.cmp(unsafe { node.as_ref() }.get_key().borrow()) {
                Ordering::Equal => return Some(node),
                Ordering::Less => curr = links.left(),
                Ordering::Greater => curr = links.right(),
            }
        }

        None
    }

    /// Links `ptr` as the root of an empty tree.
    ///
    /// # Safety
    ///
    /// The tree must be empty; `ptr` must point at a valid, unlinked element
    /// owned by the caller.
    pub(crate) unsafe fn link_root(&mut self, ptr: NonNull<T>) {
        debug_assert!(self.root.is_none());

        // The sole node of a tree is its root, and the root is always black.
        // SAFETY: guaranteed by the caller.
        unsafe { T::links(ptr).as_mut().set_color(Color::Black) };
        self.root = Some(ptr);
        self.size += 1;
    }

    /// Links `ptr` as the `side` child of `parent` and repairs the coloring.
    ///
    /// # Safety
    ///
    /// `parent` must be linked into this tree with an empty `side` slot; `ptr`
    /// must point at a valid, unlinked element owned by the caller.
    pub(crate) unsafe fn link_at(&mut self, parent: NonNull<T>, side: Side, ptr: NonNull<T>) {
        // SAFETY: guaranteed by the caller.
        unsafe {
            let ptr_links = T::links(ptr).as_mut();
            debug_assert_eq!(ptr_links.color(), Color::Red);
            debug_assert!(T::links(parent).as_ref().child(side).is_none());

            ptr_links.replace_parent(Some(parent));
            T::links(parent).as_mut().replace_child(side, Some(ptr));
        }

        self.size += 1;
        self.insert_fixup(ptr);
    }

    /// Walks from a freshly linked red node toward the root, restoring the
    /// no-red-red rule.
    fn insert_fixup(&mut self, mut node: NonNull<T>) {
        // SAFETY: `node` is linked into this tree, so every link reachable
        // from it points at a live element.
        unsafe {
            loop {
                let Some(parent) = T::links(node).as_ref().parent() else {
                    // Ran out of tree to climb; the root absorbs the red.
                    T::links(node).as_mut().set_color(Color::Black);
                    return;
                };

                if T::links(parent).as_ref().color() == Color::Black {
                    return;
                }

                // A red parent is never the root, so the grandparent exists
                // (and is black).
                let grandparent = T::links(parent).as_ref().parent().unwrap();
                let parent_side = utils::side_of(parent, grandparent);
                let uncle = T::links(grandparent).as_ref().child(parent_side.opposite());

                if utils::link_color(uncle) == Color::Red {
                    tracing::trace!("red uncle of {node:p}, recoloring and climbing");
                    T::links(parent).as_mut().set_color(Color::Black);
                    T::links(uncle.unwrap()).as_mut().set_color(Color::Black);
                    T::links(grandparent).as_mut().set_color(Color::Red);
                    node = grandparent;
                    continue;
                }

                // Black or absent uncle: rotation territory. A bent path (node
                // and parent on opposite sides) is straightened first.
                let mut pivot = parent;
                if utils::side_of(node, parent) != parent_side {
                    tracing::trace!("straightening bent path below {grandparent:p}");
                    self.rotate(parent, parent_side);
                    pivot = node;
                }

                tracing::trace!("rotating {grandparent:p} to settle insert");
                T::links(pivot).as_mut().set_color(Color::Black);
                T::links(grandparent).as_mut().set_color(Color::Red);
                self.rotate(grandparent, parent_side.opposite());
                return;
            }
        }
    }

    /// Unlinks `node` from the tree and returns its owning handle, repairing
    /// the coloring along the way.
    ///
    /// # Safety
    ///
    /// `node` must be linked into this tree.
    pub(crate) unsafe fn remove_internal(&mut self, node: NonNull<T>) -> T::Handle {
        // SAFETY: the caller guarantees `node` is linked into this tree, so
        // every link reachable from it points at a live element.
        unsafe {
            // The node physically unlinked is `target`: `node` itself when it
            // has at most one child, otherwise its in-order predecessor, which
            // afterwards takes over `node`'s position and color.
            let node_links = T::links(node).as_ref();
            let target = if node_links.left().is_some() && node_links.right().is_some() {
                utils::find_maximum(node_links.left().unwrap())
            } else {
                node
            };

            let target_links = T::links(target).as_ref();
            let child = target_links.left().or(target_links.right());

            if target_links.color() == Color::Black {
                if let Some(child) = child {
                    // A black node with a single child: the child is red,
                    // moves up, and turns black, keeping black-heights intact.
                    debug_assert_eq!(T::links(child).as_ref().color(), Color::Red);
                    T::links(child).as_mut().set_color(Color::Black);
                } else if let Some(parent) = target_links.parent() {
                    // Dropping a childless black node leaves its slot short
                    // one black; repair while the node is still in place.
                    tracing::trace!("double black at {target:p}, repairing");
                    self.remove_fixup(parent, utils::side_of(target, parent));
                }
                // A childless black root just empties the tree.
            } else {
                // A red node with one child would break the black-height rule,
                // so `target` is a leaf here and detaches without repair.
                debug_assert!(child.is_none());
            }

            // Physically detach `target`, splicing its child (if any) up. The
            // parent is re-read: the repair above may have rotated new nodes
            // above `target`.
            let parent = T::links(target).as_ref().parent();
            match parent {
                Some(parent) => {
                    let parent_links = T::links(parent).as_mut();
                    if parent_links.left() == Some(target) {
                        parent_links.replace_left(child);
                    } else {
                        parent_links.replace_right(child);
                    }
                }
                None => self.root = child,
            }
            if let Some(child) = child {
                T::links(child).as_mut().replace_parent(parent);
            }

            // If the predecessor stood in for `node`, move it into `node`'s
            // position now, inheriting its color.
            if target != node {
                self.swap_in_node_at(node, target);
            }

            self.size -= 1;
            T::links(node).as_mut().unlink();
            T::from_ptr(node)
        }
    }

    /// Repairs the missing black node at the `side` child slot of `parent`,
    /// iterating toward the root.
    fn remove_fixup(&mut self, mut parent: NonNull<T>, mut side: Side) {
        // SAFETY: `parent` is linked into this tree. The deficient slot always
        // has a sibling: the path through the sibling carries at least one
        // more black node than the deficient path does.
        unsafe {
            loop {
                let mut sibling = T::links(parent).as_ref().child(side.opposite()).unwrap();

                if T::links(sibling).as_ref().color() == Color::Red {
                    // A red sibling has black children; rotate it up so the
                    // cases below see a black sibling.
                    tracing::trace!("red sibling of deficient slot, rotating {parent:p}");
                    T::links(sibling).as_mut().set_color(Color::Black);
                    T::links(parent).as_mut().set_color(Color::Red);
                    self.rotate(parent, side);
                    sibling = T::links(parent).as_ref().child(side.opposite()).unwrap();
                }

                let near = T::links(sibling).as_ref().child(side);
                let far = T::links(sibling).as_ref().child(side.opposite());

                if utils::link_color(near) == Color::Black
                    && utils::link_color(far) == Color::Black
                {
                    if T::links(parent).as_ref().color() == Color::Red {
                        // Pull the sibling path down by trading the parent's
                        // red for the sibling's black; heights match again.
                        T::links(sibling).as_mut().set_color(Color::Red);
                        T::links(parent).as_mut().set_color(Color::Black);
                        return;
                    }

                    // Everything local is black: the whole subtree below
                    // `parent` is now short one black, so the deficiency
                    // climbs.
                    T::links(sibling).as_mut().set_color(Color::Red);
                    let Some(grandparent) = T::links(parent).as_ref().parent() else {
                        return;
                    };
                    side = utils::side_of(parent, grandparent);
                    parent = grandparent;
                    continue;
                }

                if utils::link_color(far) == Color::Black {
                    // Red near nephew: rotate it up so the red lands far.
                    let near = near.unwrap();
                    T::links(near).as_mut().set_color(Color::Black);
                    T::links(sibling).as_mut().set_color(Color::Red);
                    self.rotate(sibling, side.opposite());
                    sibling = near;
                }

                // Red far nephew: one rotation at the parent settles the debt.
                tracing::trace!("rotating {parent:p} to settle removal");
                let far = T::links(sibling).as_ref().child(side.opposite()).unwrap();
                let parent_color = T::links(parent).as_ref().color();
                T::links(sibling).as_mut().set_color(parent_color);
                T::links(parent).as_mut().set_color(Color::Black);
                T::links(far).as_mut().set_color(Color::Black);
                self.rotate(parent, side);
                return;
            }
        }
    }

    /// Rotates the subtree rooted at `node` toward `side`, promoting the child
    /// on the opposite side into `node`'s place.
    ///
    /// Keys and colors are untouched and the in-order sequence is preserved;
    /// only links change, in `O(1)`.
    ///
    /// # Safety
    ///
    /// `node` must be linked into this tree and have a `side.opposite()`
    /// child.
    unsafe fn rotate(&mut self, node: NonNull<T>, side: Side) {
        // SAFETY: guaranteed by the caller.
        unsafe {
            let node_links = T::links(node).as_mut();
            let up = node_links.child(side.opposite()).unwrap();
            let up_links = T::links(up).as_mut();
            let middle = up_links.child(side);
            let parent = node_links.parent();

            // the promoted child's `side` subtree moves over to `node`
            node_links.replace_child(side.opposite(), middle);
            if let Some(middle) = middle {
                T::links(middle).as_mut().replace_parent(Some(node));
            }

            // `up` takes `node`'s place under its former parent
            up_links.replace_parent(parent);
            match parent {
                Some(parent) => {
                    let parent_links = T::links(parent).as_mut();
                    if parent_links.left() == Some(node) {
                        parent_links.replace_left(Some(up));
                    } else {
                        parent_links.replace_right(Some(up));
                    }
                }
                None => self.root = Some(up),
            }

            // and `node` descends to `up`'s `side`
            up_links.replace_child(side, Some(node));
            node_links.replace_parent(Some(up));
        }
    }

    /// Puts `new` — already detached from its own slot — into `old`'s
    /// position: parent, children, and color.
    ///
    /// # Safety
    ///
    /// `old` must be linked into this tree; `new` must be detached from its
    /// parent and childless on at least the sides it inherits.
    unsafe fn swap_in_node_at(&mut self, old: NonNull<T>, new: NonNull<T>) {
        debug_assert_ne!(old, new);

        // SAFETY: guaranteed by the caller.
        unsafe {
            let old_links = T::links(old).as_mut();
            let new_links = T::links(new).as_mut();

            let parent = old_links.parent();
            let left = old_links.left();
            let right = old_links.right();

            new_links.replace_parent(parent);
            match parent {
                Some(parent) => {
                    let parent_links = T::links(parent).as_mut();
                    if parent_links.left() == Some(old) {
                        parent_links.replace_left(Some(new));
                    } else {
                        parent_links.replace_right(Some(new));
                    }
                }
                None => self.root = Some(new),
            }

            new_links.replace_left(left);
            if let Some(left) = left {
                T::links(left).as_mut().replace_parent(Some(new));
            }

            new_links.replace_right(right);
            if let Some(right) = right {
                T::links(right).as_mut().replace_parent(Some(new));
            }

            new_links.set_color(old_links.color());
        }
    }
}

/// Error reported by [`RBTree::check_invariants`], naming the violated rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantError {
    /// The root node is red.
    RedRoot,
    /// A red node has a red child.
    RedRed,
    /// Two paths below the same node cross different numbers of black nodes.
    BlackHeightMismatch,
    /// A child's key does not sort on the side it is linked on.
    OrderViolation,
    /// Parent and child links disagree, or a node links to itself.
    BrokenLink,
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantError::RedRoot => f.write_str("the root is red"),
            InvariantError::RedRed => f.write_str("a red node has a red child"),
            InvariantError::BlackHeightMismatch => f.write_str("black heights diverge"),
            InvariantError::OrderViolation => f.write_str("keys out of order"),
            InvariantError::BrokenLink => f.write_str("parent and child links disagree"),
        }
    }
}

/// Links to other nodes in an [`RBTree`].
///
/// In order to be part of an [`RBTree`], a type must contain an instance of
/// this type, and must implement the [`Linked`] trait.
pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

struct LinksInner<T: ?Sized> {
    color: Color,
    up: Link<T>,
    left: Link<T>,
    right: Link<T>,
    /// Tree links must always be `!Unpin`, in order to ensure that they
    /// never receive LLVM `noalias` annotations; see also
    /// <https://github.com/rust-lang/rust/issues/63818>.
    _unpin: PhantomPinned,
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("self", &format_args!("{self:p}"))
            .field("color", &self.color())
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .finish()
    }
}

impl<T: ?Sized> Links<T> {
    /// Returns new links for a [red-black tree][RBTree].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                // nodes enter the tree red; the tree recolors as needed
                color: Color::Red,
                up: None,
                left: None,
                right: None,
                _unpin: PhantomPinned,
            }),
        }
    }

    /// Returns `true` if this node is currently linked to an [`RBTree`].
    pub fn is_linked(&self) -> bool {
        // SAFETY: `inner` is only mutated while a node is linked into a tree
        // that is borrowed mutably.
        let inner = unsafe { &*self.inner.get() };
        inner.up.is_some() || inner.left.is_some() || inner.right.is_some()
    }

    /// Resets this node to its freshly created state.
    ///
    /// # Safety
    ///
    /// Calling this on a node that is still referenced by a tree **will
    /// corrupt the tree**, leaving pointers to arbitrary memory around.
    unsafe fn unlink(&mut self) {
        let inner = self.inner.get_mut();
        inner.up = None;
        inner.left = None;
        inner.right = None;
        inner.color = Color::Red;
    }

    #[inline]
    pub(crate) fn color(&self) -> Color {
        // SAFETY: as in `is_linked`.
        unsafe { (*self.inner.get()).color }
    }

    #[inline]
    fn set_color(&mut self, color: Color) {
        self.inner.get_mut().color = color;
    }

    #[inline]
    pub(crate) fn parent(&self) -> Link<T> {
        // SAFETY: as in `is_linked`.
        unsafe { (*self.inner.get()).up }
    }

    #[inline]
    pub(crate) fn left(&self) -> Link<T> {
        // SAFETY: as in `is_linked`.
        unsafe { (*self.inner.get()).left }
    }

    #[inline]
    pub(crate) fn right(&self) -> Link<T> {
        // SAFETY: as in `is_linked`.
        unsafe { (*self.inner.get()).right }
    }

    #[inline]
    pub(crate) fn child(&self, side: Side) -> Link<T> {
        match side {
            Side::Left => self.left(),
            Side::Right => self.right(),
        }
    }

    #[inline]
    fn replace_parent(&mut self, lk: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().up, lk)
    }

    #[inline]
    fn replace_left(&mut self, lk: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().left, lk)
    }

    #[inline]
    fn replace_right(&mut self, lk: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().right, lk)
    }

    #[inline]
    fn replace_child(&mut self, side: Side, child: Link<T>) -> Link<T> {
        match side {
            Side::Left => self.replace_left(child),
            Side::Right => self.replace_right(child),
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate alloc;

    use alloc::boxed::Box;
    use alloc::vec::Vec;
    use core::mem::offset_of;
    use core::pin::Pin;

    use rand::prelude::SliceRandom;

    use super::*;

    struct TestEntry {
        value: usize,
        links: Links<Self>,
    }

    impl TestEntry {
        pub fn new(value: usize) -> Pin<Box<Self>> {
            Box::pin(Self {
                value,
                links: Links::new(),
            })
        }
    }

    impl fmt::Debug for TestEntry {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("TestEntry")
                .field("value", &self.value)
                .finish()
        }
    }

    unsafe impl Linked for TestEntry {
        /// Any heap-allocated type that owns an element may be used.
        ///
        /// An element *must not* move while part of an intrusive data
        /// structure; `Pin` enforces this.
        type Handle = Pin<Box<Self>>;

        type Key = usize;

        fn into_ptr(handle: Self::Handle) -> NonNull<Self> {
            unsafe { NonNull::from(Box::leak(Pin::into_inner_unchecked(handle))) }
        }

        unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
            // Safety: `NonNull` *must* be constructed from a pinned reference
            // which the tree implementation upholds.
            Pin::new_unchecked(Box::from_raw(ptr.as_ptr()))
        }

        unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<Self>> {
            ptr.map_addr(|addr| {
                let offset = offset_of!(Self, links);
                addr.checked_add(offset).unwrap()
            })
            .cast()
        }

        fn get_key(&self) -> &Self::Key {
            &self.value
        }
    }

    fn keys(tree: &RBTree<TestEntry>) -> Vec<usize> {
        tree.iter().map(|entry| entry.value).collect()
    }

    fn height(tree: &RBTree<TestEntry>) -> usize {
        fn subtree_height(link: Link<TestEntry>) -> usize {
            match link {
                None => 0,
                Some(node) => {
                    let links = unsafe { TestEntry::links(node).as_ref() };
                    1 + subtree_height(links.left()).max(subtree_height(links.right()))
                }
            }
        }

        subtree_height(tree.root)
    }

    /// The worked example from the module tests: a 12-key tree with a bit of
    /// everything (red uncles, bent paths, deep rotations).
    const SCENARIO: [usize; 12] = [10, 18, 7, 15, 16, 30, 25, 40, 60, 2, 17, 33];

    fn scenario_tree() -> RBTree<TestEntry> {
        let mut tree = RBTree::new();
        for i in SCENARIO {
            assert!(tree.insert(TestEntry::new(i)).is_none());
            tree.assert_valid();
        }
        tree
    }

    #[test]
    fn insert_rebalances_and_sorts() {
        let tree = scenario_tree();

        assert_eq!(tree.len(), SCENARIO.len());
        assert!(tree.contains(&16));
        assert!(!tree.contains(&99));

        let mut sorted = SCENARIO.to_vec();
        sorted.sort_unstable();
        assert_eq!(keys(&tree), sorted);
    }

    #[test]
    fn remove_two_child_node() {
        let mut tree = scenario_tree();

        let removed = tree.remove(&18).unwrap();
        assert_eq!(removed.value, 18);
        tree.assert_valid();

        assert!(!tree.contains(&18));
        for i in SCENARIO {
            if i != 18 {
                assert!(tree.contains(&i), "{i} must survive removal of 18");
            }
        }
        assert_eq!(tree.len(), SCENARIO.len() - 1);
    }

    #[test]
    fn remove_absent_key_is_a_noop() {
        let mut tree = scenario_tree();

        assert!(tree.remove(&99).is_none());
        tree.assert_valid();
        assert_eq!(tree.len(), SCENARIO.len());
    }

    #[test]
    fn duplicate_insert_is_a_noop() {
        let mut tree: RBTree<TestEntry> = RBTree::new();

        assert!(tree.insert(TestEntry::new(5)).is_none());
        let rejected = tree.insert(TestEntry::new(5)).unwrap();
        assert_eq!(rejected.value, 5);

        tree.assert_valid();
        assert_eq!(tree.len(), 1);
        assert_eq!(keys(&tree), [5]);
    }

    #[test]
    fn ascending_inserts_stay_balanced() {
        let mut tree = RBTree::new();

        for i in 1..=7 {
            tree.insert(TestEntry::new(i));
            tree.assert_valid();
        }

        // 2 * log2(7 + 1)
        assert!(height(&tree) <= 6, "height was {}", height(&tree));
        assert_eq!(keys(&tree), [1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn height_stays_logarithmic() {
        let mut tree = RBTree::new();
        let mut rng = rand::rng();

        let mut nums = (0..1000).collect::<Vec<_>>();
        nums.shuffle(&mut rng);

        for i in nums {
            tree.insert(TestEntry::new(i));
        }
        tree.assert_valid();

        // 2 * log2(n + 1), rounded up to the next power of two
        let bound = 2 * usize::try_from(1001_usize.next_power_of_two().trailing_zeros()).unwrap();
        assert!(height(&tree) <= bound, "height was {}", height(&tree));
    }

    #[test]
    fn empty_tree_queries() {
        let tree: RBTree<TestEntry> = RBTree::new();

        assert!(tree.is_empty());
        assert!(tree.floor(&5).get().is_none());
        assert!(tree.ceil(&5).get().is_none());
        assert!(tree.min().get().is_none());
        assert!(tree.max().get().is_none());
        assert!(tree.iter().next().is_none());
        tree.assert_valid();
    }

    #[test]
    fn single_entry() {
        let mut tree: RBTree<TestEntry> = RBTree::new();

        tree.insert(TestEntry::new(42));
        assert_eq!(tree.min().get().unwrap().value, 42);
        assert_eq!(tree.max().get().unwrap().value, 42);

        let removed = tree.remove(&42).unwrap();
        assert_eq!(removed.value, 42);
        assert!(tree.is_empty());
        tree.assert_valid();
    }

    #[test]
    fn floor_and_ceil() {
        let mut tree: RBTree<TestEntry> = RBTree::new();
        for i in [10, 20, 30] {
            tree.insert(TestEntry::new(i));
        }

        assert_eq!(tree.floor(&25).get().unwrap().value, 20);
        assert_eq!(tree.ceil(&25).get().unwrap().value, 30);
        assert_eq!(tree.floor(&20).get().unwrap().value, 20);
        assert_eq!(tree.ceil(&20).get().unwrap().value, 20);
        assert!(tree.floor(&5).get().is_none());
        assert!(tree.ceil(&35).get().is_none());
        assert_eq!(tree.floor(&100).get().unwrap().value, 30);
        assert_eq!(tree.ceil(&0).get().unwrap().value, 10);
    }

    #[test]
    fn traversal_orders() {
        let mut tree: RBTree<TestEntry> = RBTree::new();
        // builds the two-level tree 2 { 1, 3 } with no rotations
        for i in [2, 1, 3] {
            tree.insert(TestEntry::new(i));
        }

        let preorder: Vec<_> = tree.preorder().map(|e| e.value).collect();
        let inorder: Vec<_> = tree.iter().map(|e| e.value).collect();
        let postorder: Vec<_> = tree.postorder().map(|e| e.value).collect();

        assert_eq!(preorder, [2, 1, 3]);
        assert_eq!(inorder, [1, 2, 3]);
        assert_eq!(postorder, [1, 3, 2]);

        // traversals are restartable
        assert_eq!(tree.preorder().count(), 3);
        assert_eq!(tree.postorder().count(), 3);
    }

    #[test]
    fn traversals_cover_larger_trees() {
        let tree = scenario_tree();

        let preorder: Vec<_> = tree.preorder().map(|e| e.value).collect();
        let postorder: Vec<_> = tree.postorder().map(|e| e.value).collect();
        let mut sorted = SCENARIO.to_vec();
        sorted.sort_unstable();

        assert_eq!(preorder.len(), SCENARIO.len());
        assert_eq!(postorder.len(), SCENARIO.len());

        let mut preorder_sorted = preorder.clone();
        preorder_sorted.sort_unstable();
        assert_eq!(preorder_sorted, sorted);

        let mut postorder_sorted = postorder.clone();
        postorder_sorted.sort_unstable();
        assert_eq!(postorder_sorted, sorted);

        // a parent precedes its children in pre-order and follows them in
        // post-order; the root bookends both
        assert_eq!(preorder.first(), postorder.last());
    }

    #[test]
    fn cursor_navigation() {
        let tree = scenario_tree();

        let mut cursor = tree.find(&16);
        assert_eq!(cursor.get().unwrap().value, 16);
        assert_eq!(cursor.peek_next().unwrap().value, 17);
        assert_eq!(cursor.peek_prev().unwrap().value, 15);

        cursor.move_next();
        assert_eq!(cursor.get().unwrap().value, 17);
        cursor.move_prev();
        cursor.move_prev();
        assert_eq!(cursor.get().unwrap().value, 15);
    }

    #[test]
    fn mutable_iteration() {
        let mut tree = scenario_tree();

        let visited: Vec<_> = tree.iter_mut().map(|e| e.value).collect();
        let mut sorted = SCENARIO.to_vec();
        sorted.sort_unstable();
        assert_eq!(visited, sorted);

        let mut cursor = tree.find_mut(&10);
        assert_eq!(cursor.get_mut().unwrap().value, 10);
        assert_eq!(cursor.as_cursor().peek_next().unwrap().value, 15);
    }

    #[test]
    fn cursor_remove_current() {
        let mut tree = scenario_tree();

        let mut cursor = tree.find_mut(&15);
        let removed = cursor.remove_current().unwrap();
        assert_eq!(removed.value, 15);
        // the cursor moved on to the in-order successor
        assert_eq!(cursor.get().unwrap().value, 16);

        tree.assert_valid();
        assert!(!tree.contains(&15));
    }

    #[test]
    fn entry_api() {
        let mut tree = scenario_tree();

        match tree.entry(&16) {
            Entry::Occupied(entry) => assert_eq!(entry.get().value, 16),
            Entry::Vacant(_) => panic!("16 must be occupied"),
        }

        tree.entry(&19).or_insert_with(|| TestEntry::new(19));
        tree.assert_valid();
        assert!(tree.contains(&19));

        // or_insert_with on an occupied entry must not insert
        tree.entry(&19).or_insert_with(|| panic!("19 is occupied"));
        assert_eq!(tree.len(), SCENARIO.len() + 1);

        match tree.entry(&19) {
            Entry::Occupied(entry) => {
                let removed = entry.remove();
                assert_eq!(removed.value, 19);
            }
            Entry::Vacant(_) => panic!("19 must be occupied"),
        }
        tree.assert_valid();
        assert!(!tree.contains(&19));
    }

    #[test]
    fn clear_drops_all_entries() {
        let mut tree = scenario_tree();

        tree.clear();
        assert!(tree.is_empty());
        assert!(tree.iter().next().is_none());

        // the tree is reusable afterwards
        tree.insert(TestEntry::new(1));
        tree.assert_valid();
        assert_eq!(keys(&tree), [1]);
    }

    #[test]
    fn random_inserts_and_removals() {
        let mut tree: RBTree<TestEntry> = RBTree::new();
        let mut rng = rand::rng();

        let mut nums = (0..200).collect::<Vec<_>>();
        nums.shuffle(&mut rng);

        for i in nums.clone() {
            assert!(tree.insert(TestEntry::new(i)).is_none());
            tree.assert_valid();
        }

        assert_eq!(tree.len(), nums.len());

        nums.shuffle(&mut rng);
        for i in nums {
            let removed = tree.remove(&i).unwrap();
            assert_eq!(removed.value, i);
            tree.assert_valid();
            assert!(!tree.contains(&i));
        }

        assert!(tree.is_empty());
    }

    #[test]
    fn random_inserts_and_searches() {
        let mut tree: RBTree<TestEntry> = RBTree::new();
        let mut rng = rand::rng();

        let mut nums = (0..200).collect::<Vec<_>>();
        nums.shuffle(&mut rng);

        for i in nums.clone() {
            tree.insert(TestEntry::new(i));
        }
        tree.assert_valid();

        nums.shuffle(&mut rng);
        for i in nums {
            assert_eq!(tree.find(&i).get().unwrap().value, i);
        }
    }

    #[cfg(feature = "dot")]
    #[test]
    fn dot_output() {
        let tree = scenario_tree();
        let rendered = alloc::format!("{}", tree.dot());
        assert!(rendered.contains("digraph"));
    }
}
