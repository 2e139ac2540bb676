//! crates/smoker_core/src/routes.rs
//!
//! A static route table with nested records, `:param` segments and a `*`
//! catch-all. Resolving a path yields either a redirect or the chain of
//! matched records (outermost first) that the guard inspects.

use crate::domain::{Role, RouteMeta};

#[derive(Debug, Clone)]
pub struct RouteRecord {
    pub path: String,
    pub meta: RouteMeta,
    pub redirect: Option<String>,
    pub children: Vec<RouteRecord>,
}

impl RouteRecord {
    pub fn new(path: impl Into<String>, meta: RouteMeta) -> Self {
        Self {
            path: path.into(),
            meta,
            redirect: None,
            children: Vec::new(),
        }
    }

    pub fn redirect(path: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            meta: RouteMeta::public(),
            redirect: Some(to.into()),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<RouteRecord>) -> Self {
        self.children = children;
        self
    }

    fn segments(&self) -> Vec<&str> {
        split_path(&self.path)
    }

    fn match_segments<'a>(&'a self, path: &[&str]) -> Option<Vec<&'a RouteRecord>> {
        let pattern = self.segments();
        if pattern.first() == Some(&"*") {
            return Some(vec![self]);
        }
        if pattern.len() > path.len() {
            return None;
        }
        let matches = pattern
            .iter()
            .zip(path)
            .all(|(expected, actual)| expected.starts_with(':') || expected == actual);
        if !matches {
            return None;
        }

        let rest = &path[pattern.len()..];
        if rest.is_empty() {
            return Some(vec![self]);
        }
        self.children.iter().find_map(|child| {
            child.match_segments(rest).map(|mut chain| {
                chain.insert(0, self);
                chain
            })
        })
    }
}

/// The records matched for one navigation target, outermost first.
#[derive(Debug, Clone)]
pub struct MatchedRoute<'a> {
    pub path: String,
    pub records: Vec<&'a RouteRecord>,
}

impl MatchedRoute<'_> {
    /// True if any record in the chain requires authentication.
    pub fn requires_auth(&self) -> bool {
        self.records.iter().any(|record| record.meta.requires_auth)
    }

    /// The role named by the terminal record.
    pub fn required_role(&self) -> Option<Role> {
        self.records.last().and_then(|record| record.meta.role)
    }
}

#[derive(Debug, Clone)]
pub enum Resolution<'a> {
    Redirect(String),
    Matched(MatchedRoute<'a>),
    NotFound,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteRecord>,
}

impl RouteTable {
    pub fn new(routes: Vec<RouteRecord>) -> Self {
        Self { routes }
    }

    /// Resolves `path` against the table. The first matching top-level record wins,
    /// so a catch-all belongs at the end.
    pub fn resolve(&self, path: &str) -> Resolution<'_> {
        let segments = split_path(path);
        let Some(records) = self
            .routes
            .iter()
            .find_map(|route| route.match_segments(&segments))
        else {
            return Resolution::NotFound;
        };

        match records.last().and_then(|record| record.redirect.clone()) {
            Some(to) => Resolution::Redirect(to),
            None => Resolution::Matched(MatchedRoute {
                path: path.to_string(),
                records,
            }),
        }
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}
