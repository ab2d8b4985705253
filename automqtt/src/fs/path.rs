use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Div;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::handler::Handler;
use crate::{MqttError, Result};

use super::parser::{self, CURDIR, SEP};
use super::tree::{Node, RoutingTree};

/// What a path points to in the routing tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    /// A topic, the tree node has named entries.
    Directory,
    /// A handler.
    Leaf,
    Missing,
}

/// Outcome of walking a path down the routing tree.
///
/// `handler` is set only for [`Kind::Leaf`], `children` only for
/// [`Kind::Directory`]. For [`Kind::Missing`] the canonical segments are the
/// longest prefix that was found.
pub struct Resolution {
    kind: Kind,
    handler: Option<Arc<dyn Handler>>,
    children: Option<Vec<String>>,
    canonical: Vec<String>,
}

impl Resolution {
    #[inline]
    pub(crate) fn missing(canonical: Vec<String>) -> Self {
        Self { kind: Kind::Missing, handler: None, children: None, canonical }
    }

    pub(crate) fn found(node: &Node, canonical: Vec<String>) -> Self {
        match node {
            Node::Directory(entries) => Self {
                kind: Kind::Directory,
                handler: None,
                children: Some(entries.keys().cloned().collect()),
                canonical,
            },
            Node::Leaf(h) => Self { kind: Kind::Leaf, handler: Some(h.clone()), children: None, canonical },
        }
    }

    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[inline]
    pub fn exists(&self) -> bool {
        self.kind != Kind::Missing
    }

    #[inline]
    pub fn handler(&self) -> Option<&Arc<dyn Handler>> {
        self.handler.as_ref()
    }

    /// Entry names, in the directory's iteration order.
    #[inline]
    pub fn children(&self) -> Option<&[String]> {
        self.children.as_deref()
    }

    #[inline]
    pub fn canonical_segments(&self) -> &[String] {
        &self.canonical
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("kind", &self.kind)
            .field("handler", &self.handler.as_ref().map(|h| h.name()))
            .field("children", &self.children)
            .field("canonical", &self.canonical)
            .finish()
    }
}

/// A path into a [`RoutingTree`].
///
/// Path algebra (`join`, `parent`, `relative_to`, ...) only rewrites text.
/// Anything that asks what the path points to goes through [`VirtualPath::classify`],
/// which walks the tree at most once per instance.
#[derive(Clone)]
pub struct VirtualPath {
    tree: Arc<RoutingTree>,
    segments: Vec<String>,
    normalized: String,
    resolution: OnceCell<Arc<Resolution>>,
}

impl VirtualPath {
    pub fn new<S: Into<String>>(tree: Arc<RoutingTree>, segments: Vec<S>) -> Self {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        let normalized = parser::normpath(&parser::join(&segments));
        Self { tree, segments, normalized, resolution: OnceCell::new() }
    }

    #[inline]
    pub fn tree(&self) -> &Arc<RoutingTree> {
        &self.tree
    }

    #[inline]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Normalized text, `.` for the root.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    #[inline]
    pub fn join<S: AsRef<str>>(&self, segment: S) -> VirtualPath {
        let mut segments = self.segments.clone();
        segments.push(segment.as_ref().to_owned());
        Self::new(self.tree.clone(), segments)
    }

    /// Classifies this path, walking the tree on the first call only.
    pub fn classify(&self) -> Arc<Resolution> {
        self.resolution
            .get_or_init(|| {
                let tree = &self.tree;
                let normalized = &self.normalized;
                match tree.cache() {
                    Some(cache) => {
                        cache.get_or_compute(tree.id(), normalized, || tree.lookup(&parser::parts(normalized)))
                    }
                    None => Arc::new(tree.lookup(&parser::parts(normalized))),
                }
            })
            .clone()
    }

    #[inline]
    pub fn kind(&self) -> Kind {
        self.classify().kind()
    }

    /// The path made of the canonical segments. For a missing path this is
    /// its longest existing prefix.
    #[inline]
    pub fn resolve(&self) -> VirtualPath {
        Self::new(self.tree.clone(), self.classify().canonical_segments().to_vec())
    }

    #[inline]
    pub fn exists(&self) -> bool {
        self.classify().exists()
    }

    #[inline]
    pub fn is_topic(&self) -> bool {
        self.kind() == Kind::Directory
    }

    #[inline]
    pub fn is_handler(&self) -> bool {
        self.kind() == Kind::Leaf
    }

    /// One path per directory entry. A handler has no children.
    pub fn children(&self) -> Result<Vec<VirtualPath>> {
        let res = self.classify();
        match res.kind() {
            Kind::Directory => Ok(res.children().unwrap_or_default().iter().map(|name| self.join(name)).collect()),
            Kind::Leaf => Ok(Vec::new()),
            Kind::Missing => Err(MqttError::NotFound(self.clone())),
        }
    }

    pub fn handler(&self) -> Result<Arc<dyn Handler>> {
        let res = self.classify();
        match (res.kind(), res.handler()) {
            (Kind::Leaf, Some(h)) => Ok(h.clone()),
            (Kind::Directory, _) => Err(MqttError::IsADirectory(self.clone())),
            _ => Err(MqttError::NotFound(self.clone())),
        }
    }

    /// Succeeds when the path is a topic that may be published to.
    pub fn check_topic(&self) -> Result<()> {
        match self.kind() {
            Kind::Directory => Ok(()),
            Kind::Leaf => Err(MqttError::NotADirectory(self.clone())),
            Kind::Missing => Err(MqttError::NotFound(self.clone())),
        }
    }

    /// Top-down, depth-first traversal of the directories below (and including) this path.
    #[inline]
    pub fn walk(&self) -> Walk {
        Walk { stack: vec![self.clone()] }
    }

    #[inline]
    fn resolved_text(&self) -> String {
        parser::join(self.classify().canonical_segments())
    }

    /// Resolved text of this path relative to `other` resolved.
    #[inline]
    pub fn relative_to(&self, other: &VirtualPath) -> String {
        parser::relpath(&self.resolved_text(), &other.resolved_text())
    }

    #[inline]
    pub fn relative_to_str(&self, other: &str) -> String {
        parser::relpath(&self.resolved_text(), other)
    }

    /// The first segment, if any.
    pub fn anchor(&self) -> Option<&str> {
        self.normalized.split(SEP).find(|p| !p.is_empty() && *p != CURDIR)
    }

    /// The resolved path without its anchor, e.g. `cmnde/plug/Timer1` gives `plug/Timer1`.
    pub fn strip_anchor(&self) -> String {
        let resolved = self.resolved_text();
        match resolved.split(SEP).find(|p| !p.is_empty()) {
            Some(anchor) => parser::relpath(&resolved, anchor),
            None => CURDIR.into(),
        }
    }

    /// The root is its own parent.
    pub fn parent(&self) -> VirtualPath {
        let mut parts = parser::parts(&self.normalized);
        match parts.last().map(String::as_str) {
            Some(CURDIR) | Some(SEP) | None => self.clone(),
            Some(_) => {
                parts.pop();
                Self::new(self.tree.clone(), parts)
            }
        }
    }

    /// Last segment, empty for the root.
    pub fn name(&self) -> &str {
        match self.normalized.rsplit(SEP).next() {
            Some(CURDIR) | None => "",
            Some(name) => name,
        }
    }
}

impl Div<&str> for &VirtualPath {
    type Output = VirtualPath;

    #[inline]
    fn div(self, segment: &str) -> VirtualPath {
        self.join(segment)
    }
}

impl Div<&str> for VirtualPath {
    type Output = VirtualPath;

    #[inline]
    fn div(self, segment: &str) -> VirtualPath {
        self.join(segment)
    }
}

impl PartialEq for VirtualPath {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.tree.id() == other.tree.id() && self.normalized == other.normalized
    }
}

impl Eq for VirtualPath {}

impl Hash for VirtualPath {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tree.id().hash(state);
        self.normalized.hash(state);
    }
}

impl fmt::Display for VirtualPath {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

impl fmt::Debug for VirtualPath {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPath({:?})", self.normalized)
    }
}

/// Lazy iterator returned by [`VirtualPath::walk`], yields
/// `(directory, child directory names, child handler names)`.
pub struct Walk {
    stack: Vec<VirtualPath>,
}

impl Iterator for Walk {
    type Item = (VirtualPath, Vec<String>, Vec<String>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(path) = self.stack.pop() {
            let res = path.classify();
            let Some(names) = res.children() else {
                continue;
            };
            let mut dirs = Vec::new();
            let mut leaves = Vec::new();
            for name in names {
                match path.join(name).kind() {
                    Kind::Directory => dirs.push(name.clone()),
                    Kind::Leaf => leaves.push(name.clone()),
                    Kind::Missing => {}
                }
            }
            self.stack.extend(dirs.iter().rev().map(|d| path.join(d)));
            return Some((path, dirs, leaves));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour;
    use crate::tree;

    fn sample() -> Arc<RoutingTree> {
        RoutingTree::new(tree!({
            "a" => { "b" => { "c" => {} } },
            "stat" => {
                "plug" => {
                    "TIMER" => { "retain" => (behaviour::retain()), "retained" => {} },
                    "POWER" => {},
                },
            },
            "cmnde" => { "plug" => { "Timer1" => { "marshal" => (behaviour::noop()) } } },
        }))
    }

    #[test]
    fn test_classify() {
        let root = sample().root_path();
        assert_eq!(root.kind(), Kind::Directory);
        assert_eq!((&root / "stat/plug").kind(), Kind::Directory);
        assert_eq!((&root / "stat/plug/TIMER/retain").kind(), Kind::Leaf);
        assert_eq!((&root / "stat/nope").kind(), Kind::Missing);
        assert_eq!((&root / "stat/plug/TIMER/retain/deeper").kind(), Kind::Missing);
        assert_eq!(root.join("stat").join("./plug//POWER").kind(), Kind::Directory);
        assert_eq!((&root / "Stat").kind(), Kind::Missing);
    }

    #[test]
    fn test_classify_walks_once() {
        let tree = sample();
        let path = tree.root_path().join("stat/plug/POWER");
        let first = path.classify();
        let second = path.classify();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(tree.walks().count(), 1);

        //another instance with the same text is served from the cache
        let again = tree.root_path().join("stat").join("plug/POWER");
        assert_eq!(again.kind(), Kind::Directory);
        assert_eq!(tree.walks().count(), 1);
        let cache = tree.cache().map(|c| (c.hits().count(), c.misses().count()));
        assert_eq!(cache, Some((1, 1)));
    }

    #[test]
    fn test_uncached_tree_agrees() {
        let cached = sample();
        let uncached = RoutingTree::without_cache(cached.root().clone());
        for topic in ["", "a/b", "a/b/c/d", "stat/plug/TIMER/retain", "cmnde/plug", "x"] {
            let c = cached.root_path().join(topic);
            let u = uncached.root_path().join(topic);
            assert_eq!(c.kind(), u.kind(), "{topic}");
            assert_eq!(c.resolve().segments(), u.resolve().segments(), "{topic}");
        }
        uncached.root_path().join("a/b").classify();
        uncached.root_path().join("a/b").classify();
        assert!(uncached.cache().is_none());
        assert_eq!(uncached.walks().count(), 8);
    }

    #[test]
    fn test_resolve() {
        let root = sample().root_path();
        assert_eq!((&root / "a/b/c").resolve().segments(), &["a", "b", "c"]);
        assert_eq!((&root / "a/b/x/y").resolve().segments(), &["a", "b"]);
        assert_eq!((&root / "x").resolve().segments(), &[] as &[String]);
        assert_eq!((&root / "a/./b").resolve().to_string(), "a/b");
    }

    #[test]
    fn test_children() {
        let root = sample().root_path();
        let names: Vec<String> = root.children().unwrap().iter().map(|c| c.name().to_owned()).collect();
        assert_eq!(names, vec!["a", "cmnde", "stat"]);

        let timer = &root / "stat/plug/TIMER";
        let children = timer.children().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].to_string(), "stat/plug/TIMER/retain");
        assert!(children[0].is_handler());
        assert!(children[1].is_topic());

        assert!((&root / "stat/plug/TIMER/retain").children().unwrap().is_empty());
        assert!(matches!((&root / "nope").children(), Err(MqttError::NotFound(_))));
    }

    #[test]
    fn test_kind_errors() {
        let root = sample().root_path();
        assert!((&root / "stat/plug/POWER").check_topic().is_ok());
        assert!(matches!((&root / "stat/other/POWER").check_topic(), Err(MqttError::NotFound(_))));
        assert!(matches!((&root / "stat/plug/TIMER/retain").check_topic(), Err(MqttError::NotADirectory(_))));
        assert!(matches!((&root / "stat/plug").handler(), Err(MqttError::IsADirectory(_))));
        assert!(matches!((&root / "stat/plug/x").handler(), Err(MqttError::NotFound(_))));
        assert_eq!((&root / "stat/plug/TIMER/retain").handler().unwrap().name(), "retain");

        let err = (&root / "stat/other").check_topic().unwrap_err();
        assert_eq!(err.path().map(|p| p.to_string()), Some("stat/other".to_owned()));
    }

    #[test]
    fn test_walk() {
        let root = sample().root_path();
        let walked: Vec<(String, Vec<String>, Vec<String>)> =
            root.walk().map(|(p, d, l)| (p.to_string(), d, l)).collect();
        assert_eq!(walked[0], (".".to_owned(), vec!["a".into(), "cmnde".into(), "stat".into()], vec![]));
        assert_eq!(walked[1].0, "a");
        assert_eq!(walked[2].0, "a/b");
        assert_eq!(walked[3].0, "a/b/c");
        assert_eq!(walked[4].0, "cmnde");
        let leafy: Vec<&str> = walked.iter().filter(|(_, _, l)| !l.is_empty()).map(|(p, _, _)| p.as_str()).collect();
        assert_eq!(leafy, vec!["cmnde/plug/Timer1", "stat/plug/TIMER"]);
        assert_eq!(walked.len(), 12);

        assert_eq!((&root / "nope").walk().count(), 0);
    }

    #[test]
    fn test_algebra() {
        let tree = sample();
        let root = tree.root_path();
        let p = &root / "cmnde/plug/Timer1";
        assert_eq!(p.anchor(), Some("cmnde"));
        assert_eq!(p.strip_anchor(), "plug/Timer1");
        assert_eq!(p.name(), "Timer1");
        assert_eq!(p.parent().to_string(), "cmnde/plug");
        assert_eq!(root.parent(), root);
        assert_eq!(root.name(), "");
        assert_eq!(p.relative_to(&(&root / "cmnde")), "plug/Timer1");
        assert_eq!((&root / "stat/plug/POWER").relative_to_str("stat/plug/TIMER"), "../POWER");
        assert_eq!(root.join("cmnd").join(p.strip_anchor()).to_string(), "cmnd/plug/Timer1");
        assert_eq!(root.join("stat").join("/cmnde/plug").to_string(), "/cmnde/plug");
        assert_eq!(root.join("/cmnde/plug").kind(), Kind::Directory);
    }

    #[test]
    fn test_equality() {
        let tree = sample();
        let a = tree.root_path().join("stat/plug");
        let b = tree.root_path().join("stat").join("plug/");
        assert_eq!(a, b);
        assert_ne!(a, RoutingTree::new(tree.root().clone()).root_path().join("stat/plug"));
    }
}
