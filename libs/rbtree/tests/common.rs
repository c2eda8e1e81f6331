#![allow(unused, reason = "not used by all tests")]

use std::fmt;
use std::mem::offset_of;
use std::pin::Pin;
use std::ptr::NonNull;

use rbtree::{Linked, Links, RBTree};

pub struct TestEntry {
    pub value: u16,
    links: Links<Self>,
}

impl TestEntry {
    pub fn new(value: u16) -> Pin<Box<Self>> {
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
    type Handle = Pin<Box<Self>>;

    type Key = u16;

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

pub fn keys(tree: &RBTree<TestEntry>) -> Vec<u16> {
    tree.iter().map(|entry| entry.value).collect()
}

/// Routes `tracing` output of a test through the libtest capture when
/// `RUST_LOG` asks for it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
