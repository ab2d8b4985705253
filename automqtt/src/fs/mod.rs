//! A read-only, filesystem-like view over the routing table.
//!
//! Topics are directories, handlers are files. A [`VirtualPath`] is cheap to
//! build and to join; classification walks the [`RoutingTree`] lazily and is
//! memoized both per path instance and per tree through a [`ClassificationCache`].

pub use cache::ClassificationCache;
pub use path::{Kind, Resolution, VirtualPath, Walk};
pub use tree::{Node, RoutingTree, TreeId};

mod cache;
pub mod parser;
mod path;
mod tree;

impl RoutingTree {
    /// Path of `topic` within this tree.
    #[inline]
    pub fn path<S: AsRef<str>>(self: &std::sync::Arc<Self>, topic: S) -> VirtualPath {
        self.root_path().join(topic)
    }
}
