//! Approximate in-memory size of cached values
//!
//! Sizes include the value's inline footprint plus whatever it owns on the
//! heap. Shared pointers are counted once per estimate: the first visit of an
//! `Rc`/`Arc` allocation walks into it, later visits only count the pointer.
//! That also makes reference cycles terminate.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::mem::size_of;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use sapling_core::{FileFragment, InfraFindings, LocalEdge, LocalNode, NodeAttrs, PendingReference};

/// Bookkeeping for one estimate: addresses of shared allocations already counted.
#[derive(Debug, Default)]
pub struct SizeContext {
    visited: HashSet<usize>,
}

impl SizeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time an allocation is seen.
    pub fn first_visit<T: ?Sized>(&mut self, ptr: *const T) -> bool {
        self.visited.insert(ptr as *const () as usize)
    }
}

pub trait SizeEstimate {
    fn estimate_size(&self, ctx: &mut SizeContext) -> usize;
}

/// Estimated size of `value` in bytes.
pub fn estimate_size<T: SizeEstimate + ?Sized>(value: &T) -> usize {
    value.estimate_size(&mut SizeContext::new())
}

macro_rules! inline_size {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SizeEstimate for $ty {
                fn estimate_size(&self, _ctx: &mut SizeContext) -> usize {
                    size_of::<$ty>()
                }
            }
        )*
    };
}

inline_size!(bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, ());

impl SizeEstimate for str {
    fn estimate_size(&self, _ctx: &mut SizeContext) -> usize {
        self.len()
    }
}

impl SizeEstimate for String {
    fn estimate_size(&self, _ctx: &mut SizeContext) -> usize {
        size_of::<String>() + self.len()
    }
}

impl SizeEstimate for Path {
    fn estimate_size(&self, _ctx: &mut SizeContext) -> usize {
        self.as_os_str().len()
    }
}

impl SizeEstimate for PathBuf {
    fn estimate_size(&self, _ctx: &mut SizeContext) -> usize {
        size_of::<PathBuf>() + self.as_os_str().len()
    }
}

impl<T: SizeEstimate> SizeEstimate for [T] {
    fn estimate_size(&self, ctx: &mut SizeContext) -> usize {
        self.iter().map(|item| item.estimate_size(ctx)).sum()
    }
}

impl<T: SizeEstimate> SizeEstimate for Vec<T> {
    fn estimate_size(&self, ctx: &mut SizeContext) -> usize {
        size_of::<Vec<T>>() + self.as_slice().estimate_size(ctx)
    }
}

impl<T: SizeEstimate> SizeEstimate for Option<T> {
    fn estimate_size(&self, ctx: &mut SizeContext) -> usize {
        match self {
            Some(inner) => size_of::<Option<T>>() - size_of::<T>() + inner.estimate_size(ctx),
            None => size_of::<Option<T>>(),
        }
    }
}

impl<T: SizeEstimate + ?Sized> SizeEstimate for Box<T> {
    fn estimate_size(&self, ctx: &mut SizeContext) -> usize {
        size_of::<Box<T>>() + (**self).estimate_size(ctx)
    }
}

impl<T: SizeEstimate + ?Sized> SizeEstimate for Rc<T> {
    fn estimate_size(&self, ctx: &mut SizeContext) -> usize {
        let mut size = size_of::<Rc<T>>();
        if ctx.first_visit(Rc::as_ptr(self)) {
            size += (**self).estimate_size(ctx);
        }
        size
    }
}

impl<T: SizeEstimate + ?Sized> SizeEstimate for Arc<T> {
    fn estimate_size(&self, ctx: &mut SizeContext) -> usize {
        let mut size = size_of::<Arc<T>>();
        if ctx.first_visit(Arc::as_ptr(self)) {
            size += (**self).estimate_size(ctx);
        }
        size
    }
}

impl<T: SizeEstimate> SizeEstimate for RefCell<T> {
    fn estimate_size(&self, ctx: &mut SizeContext) -> usize {
        // A value mutably borrowed elsewhere is counted by its inline size only.
        match self.try_borrow() {
            Ok(inner) => size_of::<RefCell<T>>() - size_of::<T>() + inner.estimate_size(ctx),
            Err(_) => size_of::<RefCell<T>>(),
        }
    }
}

impl<A: SizeEstimate, B: SizeEstimate> SizeEstimate for (A, B) {
    fn estimate_size(&self, ctx: &mut SizeContext) -> usize {
        self.0.estimate_size(ctx) + self.1.estimate_size(ctx)
    }
}

impl<K: SizeEstimate, V: SizeEstimate, S> SizeEstimate for HashMap<K, V, S> {
    fn estimate_size(&self, ctx: &mut SizeContext) -> usize {
        size_of::<Self>()
            + self
                .iter()
                .map(|(k, v)| k.estimate_size(ctx) + v.estimate_size(ctx))
                .sum::<usize>()
    }
}

impl<K: SizeEstimate, V: SizeEstimate> SizeEstimate for BTreeMap<K, V> {
    fn estimate_size(&self, ctx: &mut SizeContext) -> usize {
        size_of::<Self>()
            + self
                .iter()
                .map(|(k, v)| k.estimate_size(ctx) + v.estimate_size(ctx))
                .sum::<usize>()
    }
}

impl<T: SizeEstimate, S> SizeEstimate for HashSet<T, S> {
    fn estimate_size(&self, ctx: &mut SizeContext) -> usize {
        size_of::<Self>() + self.iter().map(|item| item.estimate_size(ctx)).sum::<usize>()
    }
}

impl<T: SizeEstimate> SizeEstimate for BTreeSet<T> {
    fn estimate_size(&self, ctx: &mut SizeContext) -> usize {
        size_of::<Self>() + self.iter().map(|item| item.estimate_size(ctx)).sum::<usize>()
    }
}

impl SizeEstimate for NodeAttrs {
    fn estimate_size(&self, ctx: &mut SizeContext) -> usize {
        let owned = match self {
            NodeAttrs::None | NodeAttrs::File { .. } => 0,
            NodeAttrs::Class { bases } => bases.estimate_size(ctx),
            NodeAttrs::Function { params, .. } => params.estimate_size(ctx),
            NodeAttrs::Method { owner, params, .. } => owner.estimate_size(ctx) + params.estimate_size(ctx),
            NodeAttrs::Import { module, symbol } => module.estimate_size(ctx) + symbol.estimate_size(ctx),
        };
        size_of::<NodeAttrs>() + owned
    }
}

impl SizeEstimate for LocalNode {
    fn estimate_size(&self, ctx: &mut SizeContext) -> usize {
        size_of::<LocalNode>() - size_of::<NodeAttrs>()
            + self.name.len()
            + self.summary.as_ref().map_or(0, |s| s.len())
            + self.attrs.estimate_size(ctx)
    }
}

impl SizeEstimate for LocalEdge {
    fn estimate_size(&self, _ctx: &mut SizeContext) -> usize {
        size_of::<LocalEdge>()
    }
}

impl SizeEstimate for PendingReference {
    fn estimate_size(&self, _ctx: &mut SizeContext) -> usize {
        size_of::<PendingReference>() + self.target_name.len()
    }
}

impl SizeEstimate for InfraFindings {
    fn estimate_size(&self, ctx: &mut SizeContext) -> usize {
        size_of::<InfraFindings>() + self.environments.estimate_size(ctx)
    }
}

impl SizeEstimate for FileFragment {
    fn estimate_size(&self, ctx: &mut SizeContext) -> usize {
        self.path.estimate_size(ctx)
            + self.nodes.estimate_size(ctx)
            + self.edges.estimate_size(ctx)
            + self.references.estimate_size(ctx)
            + self.findings.estimate_size(ctx)
    }
}
