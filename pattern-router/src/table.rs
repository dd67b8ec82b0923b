// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The compiled dispatch table and its builder.

use crate::constraints::Constraint;
use crate::pattern::{compile_host, compile_path, CompileError, HostPattern, PathPattern};

/// The compiled routing table.
///
/// A new instance can be created by calling [`DispatchTable::builder`]. You
/// add the routes and call [`DispatchTableBuilder::build`] to compile them:
///
/// ```rust
/// use pattern_router::DispatchTable;
///
/// let mut builder = DispatchTable::builder();
/// builder
///     .host("example.com")
///     .route("/", "index", ())
///     .route("/users/:name", "user", ());
/// builder.host("_").route("_", "fallback", ());
/// let table = builder.build().unwrap();
///
/// let found = table.match_request("example.com", "/users/alice").unwrap();
/// assert_eq!(*found.handler, "user");
/// let found = table.match_request("example.net", "/anywhere").unwrap();
/// assert_eq!(*found.handler, "fallback");
/// ```
///
/// Rules are tried in the order they were added, the first match wins. Once
/// built, the table is read-only and can be shared between any number of
/// threads without synchronization.
///
/// `H` identifies the handler responsible for a route, `O` carries whatever
/// options should reach that handler.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchTable<H, O> {
    pub(crate) hosts: Vec<HostRule<H, O>>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HostRule<H, O> {
    pub(crate) pattern: HostPattern,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) paths: Vec<PathRule<H, O>>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PathRule<H, O> {
    pub(crate) pattern: PathPattern,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) handler: H,
    pub(crate) opts: O,
}

impl<H, O> DispatchTable<H, O> {
    /// Returns a builder instance that can be used to set up the table.
    pub fn builder() -> DispatchTableBuilder<H, O> {
        DispatchTableBuilder { hosts: Vec::new() }
    }
}

/// An authored path route prior to compilation.
#[derive(Debug, Clone)]
struct PathRoute<H, O> {
    path: Vec<u8>,
    constraints: Vec<Constraint>,
    handler: H,
    opts: O,
}

/// The routes of a single host, in the order they were added.
#[derive(Debug, Clone)]
pub struct HostRoutes<H, O> {
    host: Vec<u8>,
    constraints: Vec<Constraint>,
    paths: Vec<PathRoute<H, O>>,
}

impl<H, O> HostRoutes<H, O> {
    /// Adds a path route served by the given handler.
    pub fn route(&mut self, path: impl AsRef<[u8]>, handler: H, opts: O) -> &mut Self {
        self.route_with(path, [], handler, opts)
    }

    /// Adds a path route with constraints on its bindings.
    pub fn route_with(
        &mut self,
        path: impl AsRef<[u8]>,
        constraints: impl IntoIterator<Item = Constraint>,
        handler: H,
        opts: O,
    ) -> &mut Self {
        self.paths.push(PathRoute {
            path: path.as_ref().to_vec(),
            constraints: constraints.into_iter().collect(),
            handler,
            opts,
        });
        self
    }
}

/// The builder used to set up a [`DispatchTable`] instance.
///
/// Nothing is compiled until [`DispatchTableBuilder::build`] is called, an
/// invalid pattern anywhere fails the entire build.
#[derive(Debug, Clone)]
pub struct DispatchTableBuilder<H, O> {
    hosts: Vec<HostRoutes<H, O>>,
}

impl<H, O> DispatchTableBuilder<H, O> {
    /// Adds a host and returns it for path route registration.
    ///
    /// The host `_` matches any request host.
    pub fn host(&mut self, host: impl AsRef<[u8]>) -> &mut HostRoutes<H, O> {
        self.host_with(host, [])
    }

    /// Adds a host with constraints on the bindings of its pattern.
    pub fn host_with(
        &mut self,
        host: impl AsRef<[u8]>,
        constraints: impl IntoIterator<Item = Constraint>,
    ) -> &mut HostRoutes<H, O> {
        self.hosts.push(HostRoutes {
            host: host.as_ref().to_vec(),
            constraints: constraints.into_iter().collect(),
            paths: Vec::new(),
        });
        let index = self.hosts.len() - 1;
        &mut self.hosts[index]
    }

    /// Compiles all routes into a dispatch table.
    ///
    /// Host and path patterns with optional parts expand into one rule per
    /// variant, preserving the authored order between rules.
    pub fn build(self) -> Result<DispatchTable<H, O>, CompileError>
    where
        H: Clone,
        O: Clone,
    {
        let mut hosts = Vec::with_capacity(self.hosts.len());
        for entry in self.hosts {
            let host_patterns = compile_host(&entry.host)?;
            if matches!(host_patterns.as_slice(), [HostPattern::Any])
                && !entry.constraints.is_empty()
            {
                return Err(CompileError::ConstraintsWithWildcard);
            }

            let mut paths = Vec::with_capacity(entry.paths.len());
            for route in entry.paths {
                let path_patterns = compile_path(&route.path)?;
                if matches!(path_patterns.as_slice(), [PathPattern::Any])
                    && !route.constraints.is_empty()
                {
                    return Err(CompileError::ConstraintsWithWildcard);
                }

                for pattern in path_patterns {
                    paths.push(PathRule {
                        pattern,
                        constraints: route.constraints.clone(),
                        handler: route.handler.clone(),
                        opts: route.opts.clone(),
                    });
                }
            }

            for pattern in host_patterns {
                hosts.push(HostRule {
                    pattern,
                    constraints: entry.constraints.clone(),
                    paths: paths.clone(),
                });
            }
        }
        Ok(DispatchTable { hosts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Segment;

    fn segments(pattern: &HostPattern) -> &[Segment] {
        match pattern {
            HostPattern::Segments(segments) => segments,
            other => panic!("expected segments, got {other:?}"),
        }
    }

    #[test]
    fn authored_order_is_preserved() {
        let mut builder = DispatchTable::builder();
        builder
            .host("example.com")
            .route("/a", 1u8, ())
            .route("/b", 2, ())
            .route("/c", 3, ());
        builder.host("example.net").route("/", 4, ());
        builder.host("_").route("_", 5, ());
        let table = builder.build().unwrap();

        assert_eq!(table.hosts.len(), 3);
        assert_eq!(
            table.hosts[0].paths.iter().map(|p| p.handler).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(table.hosts[1].paths[0].handler, 4);
        assert_eq!(table.hosts[2].pattern, HostPattern::Any);
        assert_eq!(table.hosts[2].paths[0].pattern, PathPattern::Any);
    }

    #[test]
    fn compilation_is_deterministic() {
        let build = || {
            let mut builder = DispatchTable::builder();
            builder
                .host("[www.]example.com")
                .route("/users[/:id]", "users", ())
                .route("/static/[...]", "static", ());
            builder.host("_").route("_", "fallback", ());
            builder.build().unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn host_variants_fan_out() {
        let mut builder = DispatchTable::builder();
        builder.host("[www.]example.com").route("/", (), ());
        let table = builder.build().unwrap();

        assert_eq!(table.hosts.len(), 2);
        assert_eq!(segments(&table.hosts[0].pattern).len(), 2);
        assert_eq!(segments(&table.hosts[1].pattern).len(), 3);
        for rule in &table.hosts {
            assert_eq!(rule.paths.len(), 1);
        }
    }

    #[test]
    fn wildcard_with_constraints_is_rejected() {
        let mut builder = DispatchTable::builder();
        builder
            .host_with("_", [Constraint::int("id")])
            .route("/", (), ());
        assert_eq!(
            builder.build(),
            Err(CompileError::ConstraintsWithWildcard)
        );

        let mut builder = DispatchTable::builder();
        builder
            .host("example.com")
            .route_with("_", [Constraint::int("id")], (), ());
        assert_eq!(
            builder.build(),
            Err(CompileError::ConstraintsWithWildcard)
        );
    }

    #[test]
    fn invalid_pattern_fails_the_build() {
        let mut builder = DispatchTable::builder();
        builder.host("example.com").route("/ok", (), ());
        builder.host("example.net").route("broken", (), ());
        assert_eq!(
            builder.build(),
            Err(CompileError::MissingSlash("broken".to_owned()))
        );
    }
}
