use core::fmt;
use core::ptr::NonNull;

use crate::{Color, Link, Linked};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

impl Side {
    pub(crate) fn opposite(&self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Returns which child slot of `parent` holds `node`.
///
/// A node is a left child exactly when its parent's left link points at it.
pub(crate) unsafe fn side_of<T>(node: NonNull<T>, parent: NonNull<T>) -> Side
where
    T: Linked + ?Sized,
{
    // SAFETY: the caller guarantees both pointers are linked into the same tree.
    let parent_links = unsafe { T::links(parent).as_ref() };
    debug_assert!(
        parent_links.left() == Some(node) || parent_links.right() == Some(node),
        "node is not a child of parent"
    );

    if parent_links.left() == Some(node) {
        Side::Left
    } else {
        Side::Right
    }
}

/// Color of a child link; absent children count as black leaves.
pub(crate) unsafe fn link_color<T: Linked + ?Sized>(link: Link<T>) -> Color {
    // SAFETY: the caller guarantees the link, if present, points at a live node.
    link.map_or(Color::Black, |node| unsafe { T::links(node).as_ref() }.color())
}

pub(crate) unsafe fn find_minimum<T: Linked + ?Sized>(mut curr: NonNull<T>) -> NonNull<T> {
    // SAFETY: all links reachable from a linked node point at live nodes.
    while let Some(left) = unsafe { T::links(curr).as_ref() }.left() {
        curr = left;
    }

    curr
}

pub(crate) unsafe fn find_maximum<T: Linked + ?Sized>(mut curr: NonNull<T>) -> NonNull<T> {
    // SAFETY: all links reachable from a linked node point at live nodes.
    while let Some(right) = unsafe { T::links(curr).as_ref() }.right() {
        curr = right;
    }

    curr
}

/// Descends to the first node a post-order traversal of `curr`'s subtree
/// visits: keep going left, falling back to the right only at unary nodes.
pub(crate) unsafe fn find_leftmost_leaf<T: Linked + ?Sized>(mut curr: NonNull<T>) -> NonNull<T> {
    loop {
        // SAFETY: all links reachable from a linked node point at live nodes.
        let links = unsafe { T::links(curr).as_ref() };
        if let Some(left) = links.left() {
            curr = left;
        } else if let Some(right) = links.right() {
            curr = right;
        } else {
            return curr;
        }
    }
}

/// In-order successor of `node`, walking through the parent links.
pub(crate) unsafe fn next<T>(node: NonNull<T>) -> Link<T>
where
    T: Linked + ?Sized,
{
    // SAFETY: the caller guarantees `node` is linked.
    let links = unsafe { T::links(node).as_ref() };

    // If we have a right subtree, its least descendant is our successor.
    if let Some(right) = links.right() {
        return Some(unsafe { find_minimum(right) });
    }

    // Otherwise climb until we step out of a left subtree.
    let mut curr = node;
    loop {
        // SAFETY: as above.
        let parent = unsafe { T::links(curr).as_ref() }.parent()?;
        if unsafe { T::links(parent).as_ref() }.right() != Some(curr) {
            return Some(parent);
        }

        curr = parent;
    }
}

/// In-order predecessor of `node`, walking through the parent links.
pub(crate) unsafe fn prev<T>(node: NonNull<T>) -> Link<T>
where
    T: Linked + ?Sized,
{
    // SAFETY: the caller guarantees `node` is linked.
    let links = unsafe { T::links(node).as_ref() };

    // If we have a left subtree, its greatest descendant is our predecessor.
    if let Some(left) = links.left() {
        return Some(unsafe { find_maximum(left) });
    }

    // Otherwise climb until we step out of a right subtree.
    let mut curr = node;
    loop {
        // SAFETY: as above.
        let parent = unsafe { T::links(curr).as_ref() }.parent()?;
        if unsafe { T::links(parent).as_ref() }.left() != Some(curr) {
            return Some(parent);
        }

        curr = parent;
    }
}
