use std::collections::BTreeSet;
use std::fmt;
use std::mem::offset_of;
use std::pin::Pin;
use std::ptr::NonNull;

use criterion::{Criterion, criterion_group, criterion_main};
use rand::prelude::SliceRandom;
use rbtree::{Linked, Links, RBTree};

struct BenchEntry {
    value: usize,
    links: Links<Self>,
}

impl BenchEntry {
    pub fn new(value: usize) -> Pin<Box<Self>> {
        Box::pin(Self {
            value,
            links: Links::new(),
        })
    }
}

impl fmt::Debug for BenchEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchEntry")
            .field("value", &self.value)
            .finish()
    }
}

unsafe impl Linked for BenchEntry {
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

    unsafe fn links(target: NonNull<Self>) -> NonNull<Links<Self>> {
        target
            .map_addr(|addr| {
                let offset = offset_of!(Self, links);
                addr.checked_add(offset).unwrap()
            })
            .cast()
    }

    fn get_key(&self) -> &Self::Key {
        &self.value
    }
}

fn bench_search(c: &mut Criterion) {
    let mut rng = rand::rng();

    let mut nums = (0..10_000).collect::<Vec<_>>();
    nums.shuffle(&mut rng);

    let mut tree: RBTree<BenchEntry> = RBTree::new();
    let mut set = BTreeSet::new();
    for i in nums.iter().copied() {
        tree.insert(BenchEntry::new(i));
        set.insert(i);
    }

    nums.shuffle(&mut rng);

    c.bench_function("RBTree::find", |b| {
        b.iter(|| {
            for i in &nums {
                assert!(tree.find(i).get().is_some());
            }
        })
    });

    c.bench_function("BTreeSet::contains", |b| {
        b.iter(|| {
            for i in &nums {
                assert!(set.contains(i));
            }
        })
    });
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
