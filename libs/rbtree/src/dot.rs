use core::fmt;
use core::ptr::NonNull;

use crate::utils::Side;
use crate::{Linked, RBTree};

/// Displays an [`RBTree`] in [graphviz] format, one node per line with its
/// color and links.
///
/// [graphviz]: https://graphviz.org/doc/info/lang.html
pub struct Dot<'a, T>
where
    T: Linked + ?Sized,
{
    pub(crate) tree: &'a RBTree<T>,
}

impl<T> Dot<'_, T>
where
    T: Linked + fmt::Debug + ?Sized,
{
    #[allow(
        clippy::only_used_in_recursion,
        reason = "need to ensure tree is borrowed for the entire time we operate on it"
    )]
    fn node_fmt(&self, f: &mut fmt::Formatter, node: NonNull<T>) -> fmt::Result {
        // SAFETY: all links in the tree point at live elements.
        unsafe {
            let node_links = T::links(node).as_ref();

            let id = node.as_ptr().cast::<u8>() as usize;
            f.write_fmt(format_args!(
                r#"{id} [label="node = {node:?} color = {color:?}"];"#,
                node = node.as_ref(),
                color = node_links.color(),
            ))?;

            if let Some(up) = node_links.parent() {
                f.write_fmt(format_args!(
                    r#"{id} -> {} [label="up"];"#,
                    up.as_ptr().cast::<u8>() as usize
                ))?;
            }

            let mut print_side = |side: Side| -> fmt::Result {
                if let Some(child) = node_links.child(side) {
                    f.write_fmt(format_args!(
                        r#"{id} -> {} [label="{side}"];"#,
                        child.as_ptr().cast::<u8>() as usize,
                    ))?;
                    self.node_fmt(f, child)?;
                }
                Ok(())
            };
            print_side(Side::Left)?;
            print_side(Side::Right)?;
        }

        Ok(())
    }
}

impl<T> fmt::Display for Dot<'_, T>
where
    T: Linked + fmt::Debug + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("digraph {")?;
        if let Some(root) = self.tree.root {
            self.node_fmt(f, root)?;
        }
        f.write_str("}")
    }
}

impl<T> fmt::Debug for Dot<'_, T>
where
    T: Linked + fmt::Debug + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
