use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::RouteError;

/// Parameter bindings collected during a lookup: `(name, value)` byte slices
/// pointing into the tree and the request path respectively. Sized so that
/// lookups do not allocate for typical patterns.
pub(crate) type RawParams<'t, 'p> = SmallVec<[(&'t [u8], &'p [u8]); 8]>;

fn longest_common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(a, b)| **a == **b).count()
}

fn find_slash(path: &[u8]) -> Option<usize> {
    path.iter().position(|&c| c == b'/')
}

fn find_wildcard(path: &[u8]) -> Option<usize> {
    path.iter().position(|&c| c == b':' || c == b'*')
}

#[derive(Debug, Eq, PartialEq)]
enum Segment<'a> {
    Static(&'a [u8]),
    Param(&'a [u8]),
    CatchAll(&'a [u8]),
}

/// Splits a pattern into static, named parameter and catch-all segments.
///
/// A placeholder must occupy a whole path segment: the sigil has to follow a
/// `/`, and the name runs to the next `/` (named parameter) or the end of the
/// pattern (catch-all). The `/` in front of a catch-all belongs to the
/// catch-all, so it is stripped from the preceding static segment.
fn parse_segments(pattern: &str) -> Result<Vec<Segment<'_>>, RouteError> {
    let invalid = || RouteError::InvalidParam(pattern.to_string());

    let mut path = pattern.as_bytes();
    let mut segments = Vec::new();
    let mut boundary = false;

    while !path.is_empty() {
        match path[0] {
            b':' => {
                if !boundary {
                    return Err(invalid());
                }
                let end = match find_slash(&path[1..]) {
                    Some(pos) => pos + 1,
                    None => path.len(),
                };
                let name = &path[1..end];
                if name.is_empty() || name.iter().any(|&c| c == b':' || c == b'*') {
                    return Err(invalid());
                }
                segments.push(Segment::Param(name));
                path = &path[end..];
                boundary = false;
            }
            b'*' => {
                if !boundary {
                    return Err(invalid());
                }
                let name = &path[1..];
                if name.iter().any(|&c| c == b'/') {
                    return Err(RouteError::CatchAllNotLast(pattern.to_string()));
                }
                if name.is_empty() || name.iter().any(|&c| c == b':' || c == b'*') {
                    return Err(invalid());
                }
                // the catch-all owns the directory slash in front of it
                if let Some(Segment::Static(prev)) = segments.last_mut() {
                    let whole = *prev;
                    *prev = &whole[..whole.len() - 1];
                }
                if matches!(segments.last(), Some(Segment::Static(prev)) if prev.is_empty()) {
                    segments.pop();
                }
                segments.push(Segment::CatchAll(name));
                path = &[];
            }
            _ => {
                let end = find_wildcard(path).unwrap_or(path.len());
                segments.push(Segment::Static(&path[..end]));
                boundary = path[end - 1] == b'/';
                path = &path[end..];
            }
        }
    }

    Ok(segments)
}

#[derive(Debug, Eq, PartialEq)]
enum NodeKind {
    Root,
    Static,
    Param,
    CatchAll,
}

/// A registered handler together with the pattern it was registered under;
/// the pattern is reported when a later registration collides with it.
#[derive(Debug, Eq, PartialEq)]
struct NodeData<T> {
    data: T,
    pattern: Arc<str>,
}

impl<T> NodeData<T> {
    fn new<P>(data: T, pattern: P) -> Self
    where
        P: Into<Arc<str>>,
    {
        Self {
            data,
            pattern: pattern.into(),
        }
    }
}

fn conflict(pattern: &str, existing: Option<&str>) -> RouteError {
    RouteError::Conflict {
        pattern: pattern.to_string(),
        existing: existing.unwrap_or_default().to_string(),
    }
}

#[derive(Debug, Eq, PartialEq)]
struct Node<T> {
    kind: NodeKind,
    /// Edge label; for `Param` and `CatchAll` nodes the placeholder name.
    path: Vec<u8>,
    /// First byte of each static child, in `children` order.
    indices: Vec<u8>,
    /// Static children, sorted by descending priority.
    children: Vec<Node<T>>,
    /// The distinguished named parameter or catch-all child, if any. Never
    /// represented in `indices`.
    wild_child: Option<Box<Node<T>>>,
    handler: Option<NodeData<T>>,
    /// Number of handlers registered in the subtree rooted here.
    priority: u32,
}

impl<T> Node<T> {
    fn new(kind: NodeKind, path: &[u8]) -> Self {
        Self {
            kind,
            path: path.to_vec(),
            indices: Vec::new(),
            children: Vec::new(),
            wild_child: None,
            handler: None,
            priority: 0,
        }
    }

    fn find_static_child(&self, first: u8) -> Option<usize> {
        (0..self.indices.len()).find(|&pos| self.indices[pos] == first)
    }

    /// Splits the edge label at `n`: the suffix becomes a child carrying the
    /// old children, wildcard and handler.
    fn split(&mut self, n: usize) {
        let lower = Node {
            kind: NodeKind::Static,
            path: self.path.split_off(n),
            indices: std::mem::take(&mut self.indices),
            children: std::mem::take(&mut self.children),
            wild_child: self.wild_child.take(),
            handler: self.handler.take(),
            priority: self.priority,
        };
        self.indices.push(lower.path[0]);
        self.children.push(lower);
    }

    /// Bumps the priority of `children[pos]` and bubbles it forward so the
    /// siblings stay sorted by descending priority. `indices` is kept in the
    /// matching order.
    fn increment_child_priority(&mut self, pos: usize) {
        self.children[pos].priority += 1;
        let priority = self.children[pos].priority;

        let mut pos = pos;
        while pos > 0 && self.children[pos - 1].priority < priority {
            self.children.swap(pos - 1, pos);
            self.indices.swap(pos - 1, pos);
            pos -= 1;
        }
    }

    /// True if a new static child starting with `first` would be shadowed by
    /// the wildcard child: a parameter shadows every sibling segment, a
    /// catch-all only the directory it is mounted on.
    fn wild_blocks_static(&self, first: u8) -> bool {
        match &self.wild_child {
            Some(wild) if wild.kind == NodeKind::CatchAll => first == b'/',
            Some(_) => true,
            None => false,
        }
    }

    /// First registered pattern in this subtree, highest priority first.
    fn first_pattern(&self) -> Option<&str> {
        if let Some(data) = &self.handler {
            return Some(data.pattern.as_ref());
        }
        for child in &self.children {
            if let Some(pattern) = child.first_pattern() {
                return Some(pattern);
            }
        }
        self.wild_child.as_deref().and_then(Node::first_pattern)
    }

    fn insert(&mut self, segments: &[Segment<'_>], pattern: &str, data: T) -> Result<(), RouteError> {
        match segments.split_first() {
            None => {
                if self.handler.is_some() {
                    return Err(RouteError::Duplicate(pattern.to_string()));
                }
                self.handler = Some(NodeData::new(data, pattern));
                Ok(())
            }
            Some((Segment::Static(name), rest)) => self.insert_static(name, rest, pattern, data),
            Some((Segment::Param(name), rest)) => self.insert_param(name, rest, pattern, data),
            Some((Segment::CatchAll(name), _)) => self.insert_catch_all(name, pattern, data),
        }
    }

    fn insert_static(
        &mut self,
        name: &[u8],
        rest: &[Segment<'_>],
        pattern: &str,
        data: T,
    ) -> Result<(), RouteError> {
        let pos = match self.find_static_child(name[0]) {
            Some(pos) => pos,
            None => {
                if self.wild_blocks_static(name[0]) {
                    let existing = self.wild_child.as_deref().and_then(Node::first_pattern);
                    return Err(conflict(pattern, existing));
                }
                self.indices.push(name[0]);
                self.children.push(Node::new(NodeKind::Static, name));
                let pos = self.children.len() - 1;
                let res = self.children[pos].insert(rest, pattern, data);
                if res.is_ok() {
                    self.increment_child_priority(pos);
                }
                return res;
            }
        };

        let n = longest_common_prefix(&self.children[pos].path, name);
        if n < self.children[pos].path.len() {
            self.children[pos].split(n);
        }
        let res = if n < name.len() {
            self.children[pos].insert_static(&name[n..], rest, pattern, data)
        } else {
            self.children[pos].insert(rest, pattern, data)
        };
        if res.is_ok() {
            self.increment_child_priority(pos);
        }
        res
    }

    fn insert_param(
        &mut self,
        name: &[u8],
        rest: &[Segment<'_>],
        pattern: &str,
        data: T,
    ) -> Result<(), RouteError> {
        // a parameter makes every static sibling unreachable
        if !self.children.is_empty() {
            let existing = self.children.iter().find_map(Node::first_pattern);
            return Err(conflict(pattern, existing));
        }
        if let Some(wild) = &self.wild_child {
            if wild.kind != NodeKind::Param || wild.path != name {
                return Err(conflict(pattern, wild.first_pattern()));
            }
        }

        let wild = self
            .wild_child
            .get_or_insert_with(|| Box::new(Node::new(NodeKind::Param, name)));
        let res = wild.insert(rest, pattern, data);
        if res.is_ok() {
            wild.priority += 1;
        }
        res
    }

    fn insert_catch_all(&mut self, name: &[u8], pattern: &str, data: T) -> Result<(), RouteError> {
        // the catch-all also matches the bare directory slash
        if let Some(pos) = self.find_static_child(b'/') {
            return Err(conflict(pattern, self.children[pos].first_pattern()));
        }
        match &self.wild_child {
            Some(wild) if wild.kind == NodeKind::CatchAll && wild.path == name => {
                Err(RouteError::Duplicate(pattern.to_string()))
            }
            Some(wild) => Err(conflict(pattern, wild.first_pattern())),
            None => {
                let mut child = Node::new(NodeKind::CatchAll, name);
                child.handler = Some(NodeData::new(data, pattern));
                child.priority = 1;
                self.wild_child = Some(Box::new(child));
                Ok(())
            }
        }
    }

    /// TSR check for a node whose label was fully consumed without a handler:
    /// is a handler exactly one trailing `/` away?
    fn tsr_on_exhausted(&self) -> bool {
        if self.kind != NodeKind::Root && self.path == b"/" && self.wild_child.is_some() {
            return true;
        }
        if let Some(pos) = self.find_static_child(b'/') {
            let child = &self.children[pos];
            if child.path.len() == 1 && child.handler.is_some() {
                return true;
            }
        }
        matches!(
            &self.wild_child,
            Some(wild) if wild.kind == NodeKind::CatchAll && wild.handler.is_some()
        )
    }

    fn ci_walk(&self, path: &[u8], fix_trailing_slash: bool, out: &mut Vec<u8>) -> bool {
        let prefix = self.path.as_slice();

        if path.len() < prefix.len() || !path[..prefix.len()].eq_ignore_ascii_case(prefix) {
            // the registered path may only differ by its trailing slash; a
            // bare `/` left over is repaired by the caller, which knows
            // whether the shortened path carries a handler
            if fix_trailing_slash
                && prefix.len() == path.len() + 1
                && prefix[path.len()] == b'/'
                && path.eq_ignore_ascii_case(&prefix[..path.len()])
                && self.handler.is_some()
            {
                out.extend_from_slice(prefix);
                return true;
            }
            return false;
        }

        out.extend_from_slice(prefix);
        let path = &path[prefix.len()..];

        if path.is_empty() {
            if self.handler.is_some() {
                return true;
            }
            if fix_trailing_slash {
                if let Some(pos) = self.find_static_child(b'/') {
                    let child = &self.children[pos];
                    if child.path.len() == 1 && child.handler.is_some() {
                        out.push(b'/');
                        return true;
                    }
                    return false;
                }
                if let Some(wild) = &self.wild_child {
                    if wild.kind == NodeKind::CatchAll && wild.handler.is_some() {
                        out.push(b'/');
                        return true;
                    }
                }
            }
            return false;
        }

        // both the registered byte and its case sibling may exist as
        // children, so every folded candidate has to be tried
        let fold = path[0].to_ascii_lowercase();
        for pos in 0..self.indices.len() {
            if self.indices[pos].to_ascii_lowercase() == fold {
                let mark = out.len();
                if self.children[pos].ci_walk(path, fix_trailing_slash, out) {
                    return true;
                }
                out.truncate(mark);
            }
        }

        match &self.wild_child {
            Some(wild) if wild.kind == NodeKind::Param => {
                let end = find_slash(path).unwrap_or(path.len());
                if end == 0 {
                    return false;
                }
                // parameter values are copied from the request verbatim
                out.extend_from_slice(&path[..end]);

                if end < path.len() {
                    if let Some(next) = wild.children.first() {
                        return next.ci_walk(&path[end..], fix_trailing_slash, out);
                    }
                    if let Some(inner) = &wild.wild_child {
                        if inner.kind == NodeKind::CatchAll {
                            out.extend_from_slice(&path[end..]);
                            return true;
                        }
                    }
                    return fix_trailing_slash && path.len() == end + 1;
                }

                if wild.handler.is_some() {
                    return true;
                }
                if fix_trailing_slash {
                    if let Some(next) = wild.children.first() {
                        if next.path == b"/" && next.handler.is_some() {
                            out.push(b'/');
                            return true;
                        }
                    }
                    if let Some(inner) = &wild.wild_child {
                        if inner.kind == NodeKind::CatchAll && inner.handler.is_some() {
                            out.push(b'/');
                            return true;
                        }
                    }
                }
                false
            }
            Some(wild) if wild.kind == NodeKind::CatchAll && path[0] == b'/' => {
                out.extend_from_slice(path);
                true
            }
            _ => fix_trailing_slash && path == b"/".as_slice() && self.handler.is_some(),
        }
    }
}

#[derive(Debug, Eq, PartialEq)]
pub(crate) struct Tree<T> {
    root: Option<Node<T>>,
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self { root: None }
    }
}

impl<T> Tree<T> {
    /// Registers `data` under `pattern`. The pattern must begin with `/`.
    ///
    /// A failed insert reports why the pattern is rejected; node splits that
    /// already happened are kept, but no handler or priority is recorded.
    pub(crate) fn add(&mut self, pattern: &str, data: T) -> Result<(), RouteError> {
        let segments = parse_segments(pattern)?;

        match &mut self.root {
            None => {
                // the root label absorbs the pattern's leading static prefix
                let (path, rest): (&[u8], &[Segment<'_>]) = match segments.split_first() {
                    Some((Segment::Static(name), rest)) => (name, rest),
                    _ => (b"", &segments),
                };
                let mut root = Node::new(NodeKind::Root, path);
                root.insert(rest, pattern, data)?;
                root.priority += 1;
                self.root = Some(root);
                Ok(())
            }
            Some(root) => {
                let res = match segments.split_first() {
                    Some((Segment::Static(name), rest)) => {
                        let n = longest_common_prefix(&root.path, name);
                        if n < root.path.len() {
                            root.split(n);
                        }
                        if n < name.len() {
                            root.insert_static(&name[n..], rest, pattern, data)
                        } else {
                            root.insert(rest, pattern, data)
                        }
                    }
                    _ => root.insert(&segments, pattern, data),
                };
                if res.is_ok() {
                    root.priority += 1;
                }
                res
            }
        }
    }

    /// Looks up `path`, appending parameter bindings to `params`.
    ///
    /// Returns the registered handler on a hit. On a miss the second value
    /// reports whether the same path with the trailing slash toggled would
    /// hit (trailing slash recommendation); bindings already appended to
    /// `params` are meaningless in that case.
    pub(crate) fn find<'t, 'p>(
        &'t self,
        mut path: &'p [u8],
        params: &mut RawParams<'t, 'p>,
    ) -> (Option<&'t T>, bool) {
        let Some(root) = &self.root else {
            return (None, false);
        };
        let mut node = root;
        // whether the path consumed so far ends at a handler; decides the
        // trailing slash recommendation when only a `/` is left over
        let mut consumed_handler = false;

        loop {
            let prefix = node.path.as_slice();

            if path.len() > prefix.len() && &path[..prefix.len()] == prefix {
                path = &path[prefix.len()..];

                if let Some(pos) = node.find_static_child(path[0]) {
                    consumed_handler = node.handler.is_some();
                    node = &node.children[pos];
                    continue;
                }

                match &node.wild_child {
                    Some(wild) if wild.kind == NodeKind::Param => {
                        let end = find_slash(path).unwrap_or(path.len());
                        if end == 0 {
                            // a parameter never matches an empty segment
                            return (None, false);
                        }
                        params.push((wild.path.as_slice(), &path[..end]));

                        if end < path.len() {
                            path = &path[end..];
                            if let Some(next) = wild.children.first() {
                                consumed_handler = wild.handler.is_some();
                                node = next;
                                continue;
                            }
                            if let Some(inner) = &wild.wild_child {
                                if inner.kind == NodeKind::CatchAll {
                                    params.push((inner.path.as_slice(), path));
                                    return (inner.handler.as_ref().map(|data| &data.data), false);
                                }
                            }
                            // dead end below the parameter segment
                            return (None, path.len() == 1);
                        }

                        return match &wild.handler {
                            Some(data) => (Some(&data.data), false),
                            None => (None, wild.tsr_on_exhausted()),
                        };
                    }
                    Some(wild) if wild.kind == NodeKind::CatchAll && path[0] == b'/' => {
                        // the catch-all takes the rest, directory slash included
                        params.push((wild.path.as_slice(), path));
                        return (wild.handler.as_ref().map(|data| &data.data), false);
                    }
                    _ => {
                        // recommend stripping the extra trailing slash
                        return (None, path == b"/".as_slice() && node.handler.is_some());
                    }
                }
            }

            if path == prefix {
                return match &node.handler {
                    Some(data) => (Some(&data.data), false),
                    None => (None, node.tsr_on_exhausted()),
                };
            }

            // recommend appending a trailing slash, but only towards a path
            // that is actually registered
            let tsr = (path == b"/".as_slice() && consumed_handler)
                || (prefix.len() == path.len() + 1
                    && prefix[path.len()] == b'/'
                    && path == &prefix[..path.len()]
                    && node.handler.is_some());
            return (None, tsr);
        }
    }

    /// Case-insensitive lookup of `path`, returning the registered path with
    /// its original casing for use as a redirect target. Parameter values are
    /// taken from `path` verbatim. With `fix_trailing_slash`, a missing or
    /// surplus trailing slash is repaired as well.
    pub(crate) fn find_case_insensitive(
        &self,
        path: &str,
        fix_trailing_slash: bool,
    ) -> Option<String> {
        let root = self.root.as_ref()?;
        let mut out = Vec::with_capacity(path.len() + 1);
        if root.ci_walk(path.as_bytes(), fix_trailing_slash, &mut out) {
            String::from_utf8(out).ok()
        } else {
            None
        }
    }
}
