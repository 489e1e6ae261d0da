//! Segment trie for path patterns.
//!
//! # Pattern Language
//! - `/` separated segments, leading and trailing slashes ignored
//! - literal segment: matched verbatim
//! - `:name`: matches any single segment and binds it under `name`
//! - `*` or `+`: matches the rest of the path (at least one segment);
//!   anything after it in a pattern is ignored
//!
//! # Design Decisions
//! - Built once, read-only afterwards; rebuilding means a new tree
//! - Patterns are inserted in sorted order so construction is reproducible
//! - One variable child per node; a later pattern renames it (last write wins)
//! - Lookup tries literal, then variable, then wildcard at every level and
//!   backtracks when a branch dead-ends

use std::collections::{BTreeMap, HashMap};

use crate::director::PathVariables;

const WILDCARDS: [&str; 2] = ["*", "+"];

/// Split a path or pattern into its segments.
pub fn split_segments(path: &str) -> Vec<&str> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

pub(crate) fn is_wildcard(segment: &str) -> bool {
    WILDCARDS.contains(&segment)
}

#[derive(Debug)]
struct RouteNode<T> {
    literals: HashMap<String, RouteNode<T>>,
    variable: Option<Box<RouteNode<T>>>,
    wildcard: Option<Box<RouteNode<T>>>,
    value: Option<T>,
    /// Variable name, only set on variable nodes.
    name: Option<String>,
}

impl<T> Default for RouteNode<T> {
    fn default() -> Self {
        Self {
            literals: HashMap::new(),
            variable: None,
            wildcard: None,
            value: None,
            name: None,
        }
    }
}

impl<T> RouteNode<T> {
    /// Depth-first lookup starting at `depth`. Bound variables are pushed as
    /// (name, segment index) and popped again when a branch fails.
    fn lookup<'n>(
        &'n self,
        segments: &[&str],
        depth: usize,
        bound: &mut Vec<(&'n str, usize)>,
    ) -> Option<(&'n T, Option<usize>)> {
        let Some(segment) = segments.get(depth) else {
            return self.value.as_ref().map(|value| (value, None));
        };

        if let Some(child) = self.literals.get(*segment) {
            if let Some(found) = child.lookup(segments, depth + 1, bound) {
                return Some(found);
            }
        }

        if let Some(child) = &self.variable {
            bound.push((child.name.as_deref().unwrap_or_default(), depth));
            if let Some(found) = child.lookup(segments, depth + 1, bound) {
                return Some(found);
            }
            bound.pop();
        }

        self.wildcard
            .as_ref()
            .and_then(|child| child.value.as_ref())
            .map(|value| (value, Some(depth)))
    }
}

/// Result of a successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'a, T> {
    pub value: &'a T,
    pub variables: PathVariables,
    /// Path captured by a wildcard segment, without a leading slash.
    pub remainder: Option<String>,
}

/// Immutable lookup structure mapping path patterns to values.
#[derive(Debug)]
pub struct RouteTree<T> {
    root: RouteNode<T>,
    len: usize,
}

impl<T> RouteTree<T> {
    /// Build a tree from `(pattern, value)` pairs.
    ///
    /// Input order does not matter; duplicates of the same pattern string
    /// keep the value that came last.
    pub fn build<I, P>(routes: I) -> Self
    where
        I: IntoIterator<Item = (P, T)>,
        P: Into<String>,
    {
        let sorted: BTreeMap<String, T> = routes
            .into_iter()
            .map(|(pattern, value)| (pattern.into(), value))
            .collect();

        let mut tree = Self {
            root: RouteNode::default(),
            len: sorted.len(),
        };
        for (pattern, value) in sorted {
            tree.insert(&pattern, value);
        }
        tree
    }

    fn insert(&mut self, pattern: &str, value: T) {
        let segments = split_segments(pattern);
        let mut node = &mut self.root;

        for (index, segment) in segments.iter().enumerate() {
            if is_wildcard(segment) {
                if index + 1 < segments.len() {
                    tracing::warn!(pattern = %pattern, "Segments after wildcard are ignored");
                }
                node = &mut **node.wildcard.get_or_insert_with(Box::default);
                break;
            }

            node = match segment.strip_prefix(':') {
                Some(name) => {
                    let child = node.variable.get_or_insert_with(Box::default);
                    if let Some(previous) = child.name.as_deref().filter(|prev| *prev != name) {
                        tracing::warn!(
                            pattern = %pattern,
                            previous = %previous,
                            name = %name,
                            "Conflicting variable names at one level, last one wins"
                        );
                    }
                    child.name = Some(name.to_string());
                    &mut **child
                }
                None => node.literals.entry(segment.to_string()).or_default(),
            };
        }

        node.value = Some(value);
    }

    /// Match a request path against the tree.
    ///
    /// A node reached without an attached value (a prefix of a longer
    /// pattern) is not a match.
    pub fn find(&self, path: &str) -> Option<RouteMatch<'_, T>> {
        let segments = split_segments(path);
        let mut bound = Vec::new();
        let (value, wildcard_at) = self.root.lookup(&segments, 0, &mut bound)?;

        let variables = bound
            .into_iter()
            .map(|(name, index)| (name, segments[index]))
            .collect();
        let remainder = wildcard_at.map(|index| segments[index..].join("/"));

        Some(RouteMatch {
            value,
            variables,
            remainder,
        })
    }

    /// Number of distinct patterns the tree was built from.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn tree(routes: &[(&str, &'static str)]) -> RouteTree<&'static str> {
        RouteTree::build(routes.iter().map(|(p, v)| (p.to_string(), *v)))
    }

    #[test]
    fn test_precedence_round_trip() {
        let rt = tree(&[("/a/b/c", "D1"), ("/a/:id/c", "D2"), ("/a/*", "D3")]);

        let m = rt.find("/a/b/c").unwrap();
        assert_eq!(*m.value, "D1");
        assert!(m.variables.is_empty());

        let m = rt.find("/a/x/c").unwrap();
        assert_eq!(*m.value, "D2");
        assert_eq!(m.variables.get("id"), Some("x"));

        let m = rt.find("/a/x/y").unwrap();
        assert_eq!(*m.value, "D3");
        assert!(m.variables.is_empty());
        assert_eq!(m.remainder.as_deref(), Some("x/y"));
    }

    #[test]
    fn test_literal_beats_variable_beats_wildcard() {
        let rt = tree(&[("/u/me", "literal"), ("/u/:id", "variable"), ("/u/*", "wildcard")]);

        assert_eq!(*rt.find("/u/me").unwrap().value, "literal");
        assert_eq!(*rt.find("/u/42").unwrap().value, "variable");
        assert_eq!(*rt.find("/u/42/posts").unwrap().value, "wildcard");
    }

    #[test]
    fn test_original_router_table() {
        let rt = tree(&[
            ("/segment1/segment2/segment3", "s1-exact"),
            ("/segment1/*", "s1-any"),
            ("/segment2/segment3", "s2"),
            ("/segment3/:user_id/*", "s3-any"),
            ("/segment3/:user_id/resource", "s3-resource"),
            ("/segment4/:user_id/*", "s4-any"),
            ("/", "root"),
        ]);

        let cases = [
            ("/segment1/segment2/segment3", Some("s1-exact")),
            ("/segment1/segment2/segment3/whatever", Some("s1-any")),
            ("/segment2/segment3/", Some("s2")),
            ("/segment3/user123/resource", Some("s3-resource")),
            ("/segment3/user123/whatever", Some("s3-any")),
            ("/segment4/user123/resource", Some("s4-any")),
            ("/nomatch/", None),
            ("/", Some("root")),
        ];

        for (path, expected) in cases {
            assert_eq!(rt.find(path).map(|m| *m.value), expected, "path {}", path);
        }

        let m = rt.find("/segment3/user123/whatever").unwrap();
        assert_eq!(m.variables.get("user_id"), Some("user123"));
    }

    #[test]
    fn test_incomplete_prefix_is_not_a_match() {
        let rt = tree(&[("/a/b/c", "deep")]);
        assert!(rt.find("/a/b").is_none());
        assert!(rt.find("/a").is_none());
        assert!(rt.find("/").is_none());
    }

    #[test]
    fn test_wildcard_needs_a_segment() {
        let rt = tree(&[("/files/+", "files")]);
        assert!(rt.find("/files").is_none());
        let m = rt.find("/files/x/y/z.txt").unwrap();
        assert_eq!(m.remainder.as_deref(), Some("x/y/z.txt"));
    }

    #[test]
    fn test_segments_after_wildcard_are_ignored() {
        let rt = tree(&[("/static/*/ignored", "static")]);
        assert_eq!(*rt.find("/static/css/site.css").unwrap().value, "static");
    }

    #[test]
    fn test_failed_variable_branch_unbinds() {
        let rt = tree(&[("/a/:id/c", "var"), ("/a/*", "any")]);
        let m = rt.find("/a/x/d").unwrap();
        assert_eq!(*m.value, "any");
        assert!(m.variables.get("id").is_none());
    }

    #[test]
    fn test_construction_is_order_independent() {
        let routes = [
            ("/a/b", "1"),
            ("/a/:x/c", "2"),
            ("/a/:y/d", "3"),
            ("/b/*", "4"),
        ];
        let forward = tree(&routes);
        let mut reversed = routes.to_vec();
        reversed.reverse();
        let backward = tree(&reversed);

        for path in ["/a/b", "/a/q/c", "/a/q/d", "/b/z", "/c"] {
            let f = forward.find(path).map(|m| (*m.value, m.variables));
            let b = backward.find(path).map(|m| (*m.value, m.variables));
            assert_eq!(f, b, "path {}", path);
        }

        // Sorted insertion: ":y" is inserted last and names the shared node.
        let m = forward.find("/a/q/c").unwrap();
        assert_eq!(m.variables.get("y"), Some("q"));
    }

    #[test]
    fn test_multiple_variables() {
        let rt = tree(&[("/users/:user/posts/:post", "post")]);
        let m = rt.find("/users/7/posts/99").unwrap();
        assert_eq!(m.variables.get("user"), Some("7"));
        assert_eq!(m.variables.get("post"), Some("99"));
        assert_eq!(m.variables.len(), 2);
    }

    #[test]
    fn test_concurrent_lookups() {
        let rt = Arc::new(tree(&[("/a/:id", "a"), ("/b/*", "b")]));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let rt = rt.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let path = format!("/a/{}", i);
                        let m = rt.find(&path).unwrap();
                        assert_eq!(m.variables.get("id"), Some(i.to_string().as_str()));
                        assert_eq!(*rt.find("/b/x/y").unwrap().value, "b");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_split_segments() {
        assert!(split_segments("/").is_empty());
        assert!(split_segments("").is_empty());
        assert_eq!(split_segments("/a/b/"), vec!["a", "b"]);
        assert_eq!(split_segments("a"), vec!["a"]);
    }
}
