use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::handler::Handler;
use crate::utils::Counter;

use super::cache::ClassificationCache;
use super::parser::{CURDIR, SEP};
use super::path::{Resolution, VirtualPath};

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`RoutingTree`] instance.
pub type TreeId = u64;

/// A routing table entry: either a topic (a directory of named entries) or a handler.
#[derive(Clone)]
pub enum Node {
    Directory(BTreeMap<String, Node>),
    Leaf(Arc<dyn Handler>),
}

impl Node {
    #[inline]
    pub fn empty() -> Node {
        Node::Directory(BTreeMap::new())
    }

    #[inline]
    pub fn directory<I, N>(entries: I) -> Node
    where
        I: IntoIterator<Item = (N, Node)>,
        N: Into<String>,
    {
        Node::Directory(entries.into_iter().map(|(name, node)| (name.into(), node)).collect())
    }

    #[inline]
    pub fn leaf<H: Handler + 'static>(handler: H) -> Node {
        Node::Leaf(Arc::new(handler))
    }

    #[inline]
    pub fn is_directory(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&Node> {
        match self {
            Node::Directory(entries) => entries.get(name),
            Node::Leaf(_) => None,
        }
    }

    /// Inserts `node` under the `/`-separated `path`, creating missing
    /// directories and merging into an existing directory. Returns `false`
    /// when the path crosses a handler or would replace one.
    pub fn insert(&mut self, path: &str, node: Node) -> bool {
        let mut names = path.split(SEP).filter(|p| !p.is_empty() && *p != CURDIR).peekable();
        let mut cur = self;
        while let Some(name) = names.next() {
            let entries = match cur {
                Node::Directory(entries) => entries,
                Node::Leaf(_) => return false,
            };
            if names.peek().is_none() {
                return match entries.get_mut(name) {
                    Some(existing) => existing.merge(node),
                    None => {
                        entries.insert(name.to_owned(), node);
                        true
                    }
                };
            }
            cur = entries.entry(name.to_owned()).or_insert_with(Node::empty);
        }
        cur.merge(node)
    }

    /// Merges the entries of `node` into this directory, existing entries win on conflict.
    pub fn merge(&mut self, node: Node) -> bool {
        match (self, node) {
            (Node::Directory(entries), Node::Directory(others)) => {
                let mut merged = true;
                for (name, other) in others {
                    match entries.get_mut(&name) {
                        Some(existing) => merged &= existing.merge(other),
                        None => {
                            entries.insert(name, other);
                        }
                    }
                }
                merged
            }
            _ => false,
        }
    }

    #[inline]
    pub fn nodes_size(&self) -> usize {
        match self {
            Node::Directory(entries) => entries.len() + entries.values().map(Node::nodes_size).sum::<usize>(),
            Node::Leaf(_) => 0,
        }
    }

    #[inline]
    pub fn leaves_size(&self) -> usize {
        match self {
            Node::Directory(entries) => entries.values().map(Node::leaves_size).sum(),
            Node::Leaf(_) => 1,
        }
    }
}

impl From<Arc<dyn Handler>> for Node {
    #[inline]
    fn from(handler: Arc<dyn Handler>) -> Self {
        Node::Leaf(handler)
    }
}

impl<H: Handler + 'static> From<Arc<H>> for Node {
    #[inline]
    fn from(handler: Arc<H>) -> Self {
        Node::Leaf(handler)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Directory(entries) => f.debug_map().entries(entries.iter()).finish(),
            Node::Leaf(h) => write!(f, "<{}>", h.name()),
        }
    }
}

/// Builds a [`Node`] from a nested literal.
///
/// ```
/// use automqtt::{behaviour, tree};
///
/// let node = tree!({
///     "stat" => {
///         "plug" => { "TIMER" => { "retain" => (behaviour::retain()), "retained" => {} } },
///     },
/// });
/// assert_eq!(node.leaves_size(), 1);
/// ```
#[macro_export]
macro_rules! tree {
    ({}) => {
        $crate::fs::Node::empty()
    };
    ({ $($name:expr => $value:tt),+ $(,)? }) => {
        $crate::fs::Node::directory(::std::vec![$(($name, $crate::tree!($value))),+])
    };
    ($handler:expr) => {
        $crate::fs::Node::from($handler)
    };
}

/// The immutable routing table shared by every [`VirtualPath`] built over it.
pub struct RoutingTree {
    id: TreeId,
    root: Node,
    cache: Option<ClassificationCache>,
    walks: Counter,
}

impl RoutingTree {
    #[inline]
    pub fn new(root: Node) -> Arc<Self> {
        Self::build(root, Some(ClassificationCache::new()))
    }

    /// A tree whose paths always walk the nodes, for comparing against the cached behaviour.
    #[inline]
    pub fn without_cache(root: Node) -> Arc<Self> {
        Self::build(root, None)
    }

    fn build(root: Node, cache: Option<ClassificationCache>) -> Arc<Self> {
        let id = NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!("routing tree {} built, nodes: {}, handlers: {}", id, root.nodes_size(), root.leaves_size());
        Arc::new(Self { id, root, cache, walks: Counter::new() })
    }

    /// Path addressing the root of this tree.
    #[inline]
    pub fn root_path(self: &Arc<Self>) -> VirtualPath {
        VirtualPath::new(self.clone(), Vec::<String>::new())
    }

    #[inline]
    pub fn id(&self) -> TreeId {
        self.id
    }

    #[inline]
    pub fn root(&self) -> &Node {
        &self.root
    }

    #[inline]
    pub fn cache(&self) -> Option<&ClassificationCache> {
        self.cache.as_ref()
    }

    /// Number of node walks performed so far.
    #[inline]
    pub fn walks(&self) -> &Counter {
        &self.walks
    }

    /// Walks `parts` down from the root. Stops at the first name that is
    /// absent or that would descend through a handler.
    pub(crate) fn lookup(&self, parts: &[String]) -> Resolution {
        self.walks.inc();
        let mut cur = &self.root;
        let mut consumed = Vec::with_capacity(parts.len());
        for part in parts {
            if part.is_empty() || part == CURDIR || part == SEP {
                continue;
            }
            match cur.get(part) {
                Some(node) => {
                    consumed.push(part.clone());
                    cur = node;
                }
                None => return Resolution::missing(consumed),
            }
        }
        Resolution::found(cur, consumed)
    }
}

impl fmt::Debug for RoutingTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RoutingTree {{ id: {}, nodes_size: {}, leaves_size: {}, cached: {} }}",
            self.id,
            self.root.nodes_size(),
            self.root.leaves_size(),
            self.cache.is_some()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour;

    #[test]
    fn test_insert() {
        let mut root = Node::empty();
        assert!(root.insert("stat/plug/POWER/global-power", Node::from(behaviour::noop())));
        assert!(root.insert("stat/plug/POWER", Node::empty()));
        assert!(root.insert("stat/group/POWER", Node::empty()));
        let power = |root: &Node| root.get("stat").and_then(|n| n.get("plug")).and_then(|n| n.get("POWER")).cloned();
        assert!(power(&root).is_some());
        assert_eq!(root.leaves_size(), 1);

        //handlers are never replaced nor crossed
        assert!(!root.insert("stat/plug/POWER/global-power", Node::empty()));
        assert!(!root.insert("stat/plug/POWER/global-power/x", Node::empty()));
        assert!(power(&root).and_then(|n| n.get("global-power").map(Node::is_leaf)).unwrap_or(false));
        assert_eq!(root.nodes_size(), 6);
    }

    #[test]
    fn test_tree_macro() {
        let node = tree!({
            "stat" => { "plug" => { "TIMER" => { "retain" => (behaviour::retain()), "retained" => {} } } },
            "cmnd" => {},
        });
        assert!(node.is_directory());
        assert_eq!(node.leaves_size(), 1);
        assert_eq!(node.nodes_size(), 6);
        assert_eq!(format!("{:?}", node.get("cmnd").unwrap()), "{}");
    }

    #[test]
    fn test_tree_ids() {
        let a = RoutingTree::new(Node::empty());
        let b = RoutingTree::without_cache(Node::empty());
        assert_ne!(a.id(), b.id());
        assert!(a.cache().is_some());
        assert!(b.cache().is_none());
    }
}
