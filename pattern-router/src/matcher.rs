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

//! The match engine walking a compiled dispatch table.
//!
//! Host rules are tried in the order they were added. The first host rule
//! whose pattern matches and whose constraints accept commits the request,
//! only its path rules are tried then. A request host that cannot be split
//! into labels matches no host pattern but still matches a host wildcard.

use std::borrow::Cow;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

use crate::constraints::{check_constraints, BindingValue};
use crate::pattern::{HostPattern, PathPattern, Segment};
use crate::split::{split_host, split_path, Token};
use crate::table::{DispatchTable, HostRule, PathRule};

/// Classified reasons for a request not matching any route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MatchError {
    /// No host rule accepted the request host.
    #[error("no route matches the request host")]
    HostNotFound,

    /// A host rule accepted the request host but none of its path rules
    /// accepted the path.
    #[error("no route matches the request path")]
    PathNotFound,

    /// The request path doesn't begin with a slash or contains an invalid
    /// percent escape.
    #[error("the request path is malformed")]
    PathBadRequest,
}

/// The variables captured from the host and path patterns, in the order they
/// were bound.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    entries: Vec<(Arc<str>, BindingValue)>,
}

impl Bindings {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Looks up the value bound to the given name.
    pub fn get(&self, name: &str) -> Option<&BindingValue> {
        self.entries
            .iter()
            .find(|(entry, _)| entry.as_ref() == name)
            .map(|(_, value)| value)
    }

    /// Iterates over the bound names and values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BindingValue)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_ref(), value))
    }

    /// Number of bound names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether nothing was bound.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn value_mut(&mut self, name: &str) -> Option<&mut BindingValue> {
        self.entries
            .iter_mut()
            .find(|(entry, _)| entry.as_ref() == name)
            .map(|(_, value)| value)
    }

    /// Binds a name to a segment value. Rebinding an existing name succeeds
    /// only if the new value is identical to the bound one.
    pub(crate) fn bind(&mut self, name: &Arc<str>, value: &[u8]) -> bool {
        if let Some(existing) = self.get(name) {
            existing.as_bytes() == Some(value)
        } else {
            self.entries.push((Arc::clone(name), value.into()));
            true
        }
    }
}

impl Debug for Bindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(name, value)| (name.as_ref(), value)))
            .finish()
    }
}

/// A matched route.
///
/// `handler` and `opts` are borrowed from the table, bindings and the rest
/// token lists belong to the request.
#[derive(Debug)]
pub struct RouteMatch<'t, H, O> {
    /// The handler of the matched route.
    pub handler: &'t H,
    /// The options of the matched route.
    pub opts: &'t O,
    /// The variables captured from the host and path patterns.
    pub bindings: Bindings,
    /// The host labels a trailing host wildcard absorbed, leftmost label
    /// first. `None` if the host pattern had no trailing wildcard.
    pub host_rest: Option<Vec<Token>>,
    /// The path segments a trailing path wildcard absorbed. `None` if the
    /// path pattern had no trailing wildcard.
    pub path_rest: Option<Vec<Token>>,
}

enum HostArg<'a> {
    Raw(&'a [u8]),
    Tokens(&'a [Token]),
}

enum PathArg<'a> {
    Raw(&'a [u8]),
    Tokens(&'a [Token]),
    BadRequest,
}

impl<H, O> DispatchTable<H, O> {
    /// Matches a request host and path against the table.
    ///
    /// The host and path are taken as sent by the client, the path has to
    /// begin with a slash unless it is the literal `*` request target.
    pub fn match_request(
        &self,
        host: &(impl AsRef<[u8]> + ?Sized),
        path: &(impl AsRef<[u8]> + ?Sized),
    ) -> Result<RouteMatch<'_, H, O>, MatchError> {
        self.match_inner(HostArg::Raw(host.as_ref()), PathArg::Raw(path.as_ref()))
    }

    /// Matches pre-tokenized host and path against the table.
    ///
    /// The host tokens are expected in the [`split_host`] order, rightmost
    /// label first. Passing `None` for the path indicates a path that failed
    /// tokenization; it matches only path wildcard rules and produces
    /// [`MatchError::PathBadRequest`] otherwise. The `*` request target
    /// cannot be expressed as tokens, matching it requires the raw path.
    pub fn match_tokens(
        &self,
        host: &[Token],
        path: Option<&[Token]>,
    ) -> Result<RouteMatch<'_, H, O>, MatchError> {
        let path = match path {
            Some(tokens) => PathArg::Tokens(tokens),
            None => PathArg::BadRequest,
        };
        self.match_inner(HostArg::Tokens(host), path)
    }

    fn match_inner(
        &self,
        host: HostArg<'_>,
        path: PathArg<'_>,
    ) -> Result<RouteMatch<'_, H, O>, MatchError> {
        // The host is only split once the first non-wildcard rule needs it,
        // a table of wildcard rules accepts even unsplittable hosts.
        let mut split: Option<Option<Vec<Token>>> = None;

        for rule in &self.hosts {
            let (bindings, host_rest) = match &rule.pattern {
                HostPattern::Any => (Bindings::new(), None),
                HostPattern::Segments(segments) => {
                    let tokens = match &host {
                        HostArg::Tokens(tokens) => *tokens,
                        HostArg::Raw(raw) => {
                            match split.get_or_insert_with(|| split_host(raw)) {
                                Some(tokens) => tokens.as_slice(),
                                None => continue,
                            }
                        }
                    };

                    let (mut bindings, host_rest) =
                        match list_match(tokens, segments, Bindings::new()) {
                            Some(matched) => matched,
                            None => continue,
                        };

                    // Rest labels are presented in authored reading order,
                    // leftmost subdomain label first.
                    let host_rest = host_rest.map(|mut rest| {
                        rest.reverse();
                        rest
                    });

                    if !check_constraints(&rule.constraints, &mut bindings) {
                        continue;
                    }
                    (bindings, host_rest)
                }
            };

            // The first accepting host rule commits the request, path rules
            // of later host rules are never considered.
            return match_paths(rule, bindings, host_rest, &path);
        }
        Err(MatchError::HostNotFound)
    }
}

fn match_paths<'t, H, O>(
    rule: &'t HostRule<H, O>,
    bindings: Bindings,
    host_rest: Option<Vec<Token>>,
    path: &PathArg<'_>,
) -> Result<RouteMatch<'t, H, O>, MatchError> {
    let mut raw: Option<&[u8]> = None;
    let mut tokens: Option<Cow<'_, [Token]>> = None;
    match *path {
        PathArg::Raw(bytes) => raw = Some(bytes),
        PathArg::Tokens(list) => tokens = Some(Cow::Borrowed(list)),
        PathArg::BadRequest => {}
    }
    let bad_request = matches!(path, PathArg::BadRequest);

    for route in &rule.paths {
        match &route.pattern {
            PathPattern::Any => {
                return Ok(found(route, bindings, host_rest, None));
            }
            _ if bad_request => return Err(MatchError::PathBadRequest),
            PathPattern::Asterisk => {
                if raw == Some(b"*".as_slice()) {
                    return Ok(found(route, bindings, host_rest, None));
                }
                // A tokenized path is never the `*` request target. A raw
                // path reaching this rule is split like for any other rule.
                ensure_tokens(&mut raw, &mut tokens)?;
            }
            PathPattern::Segments(segments) => {
                ensure_tokens(&mut raw, &mut tokens)?;
                let list = match &tokens {
                    Some(list) => list.as_ref(),
                    None => continue,
                };

                if let Some((mut path_bindings, path_rest)) =
                    list_match(list, segments, bindings.clone())
                {
                    if check_constraints(&route.constraints, &mut path_bindings) {
                        return Ok(found(route, path_bindings, host_rest, path_rest));
                    }
                }
            }
        }
    }
    Err(MatchError::PathNotFound)
}

/// Splits a still raw path, failing the request on malformed paths.
fn ensure_tokens<'p>(
    raw: &mut Option<&'p [u8]>,
    tokens: &mut Option<Cow<'p, [Token]>>,
) -> Result<(), MatchError> {
    if let Some(bytes) = raw.take() {
        match split_path(bytes) {
            Some(list) => *tokens = Some(Cow::Owned(list)),
            None => return Err(MatchError::PathBadRequest),
        }
    }
    Ok(())
}

fn found<'t, H, O>(
    route: &'t PathRule<H, O>,
    bindings: Bindings,
    host_rest: Option<Vec<Token>>,
    path_rest: Option<Vec<Token>>,
) -> RouteMatch<'t, H, O> {
    RouteMatch {
        handler: &route.handler,
        opts: &route.opts,
        bindings,
        host_rest,
        path_rest,
    }
}

/// Matches tokens against pattern segments, capturing bindings and the
/// tokens absorbed by a trailing rest segment.
fn list_match(
    tokens: &[Token],
    pattern: &[Segment],
    mut bindings: Bindings,
) -> Option<(Bindings, Option<Vec<Token>>)> {
    if let Some((Segment::Rest, rest)) = pattern.split_first() {
        if rest.is_empty() {
            return Some((bindings, Some(tokens.to_vec())));
        }
    }

    match (tokens.split_first(), pattern.split_first()) {
        (Some((token, tokens)), Some((segment, pattern))) => match segment {
            Segment::AnyOne => list_match(tokens, pattern, bindings),
            Segment::Literal(literal) => {
                if literal == token {
                    list_match(tokens, pattern, bindings)
                } else {
                    None
                }
            }
            Segment::Bind(name) => {
                if bindings.bind(name, token) {
                    list_match(tokens, pattern, bindings)
                } else {
                    None
                }
            }
            Segment::Rest => None,
        },
        (None, None) => Some((bindings, None)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{Constraint, ConstraintResult};

    fn tokens(list: &[&str]) -> Vec<Token> {
        list.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    fn bound(bindings: &Bindings) -> Vec<(String, BindingValue)> {
        bindings
            .iter()
            .map(|(name, value)| (name.to_owned(), value.clone()))
            .collect()
    }

    #[test]
    fn wildcard_table() {
        let mut builder = DispatchTable::builder();
        builder.host("_").route("_", "h", "o");
        let table = builder.build().unwrap();

        let found = table.match_request("any", "/").unwrap();
        assert_eq!(*found.handler, "h");
        assert_eq!(*found.opts, "o");
        assert!(found.bindings.is_empty());
        assert_eq!(found.host_rest, None);
        assert_eq!(found.path_rest, None);
    }

    #[test]
    fn path_bindings() {
        let mut builder = DispatchTable::builder();
        builder
            .host("ninenines.eu")
            .route("/users/:id/friends", "friends", ())
            .route("_", "any", ());
        let table = builder.build().unwrap();

        let found = table
            .match_request("ninenines.eu", "/users/42/friends")
            .unwrap();
        assert_eq!(*found.handler, "friends");
        assert_eq!(
            bound(&found.bindings),
            vec![("id".to_owned(), BindingValue::from("42"))]
        );
        assert_eq!(found.host_rest, None);
        assert_eq!(found.path_rest, None);

        let found = table.match_request("ninenines.eu", "/").unwrap();
        assert_eq!(*found.handler, "any");
        assert!(found.bindings.is_empty());

        assert_eq!(
            table.match_request("example.com", "/").unwrap_err(),
            MatchError::HostNotFound
        );
    }

    #[test]
    fn host_rest_is_reversed() {
        let mut builder = DispatchTable::builder();
        builder.host("[...].ninenines.eu").route("_", "h", ());
        let table = builder.build().unwrap();

        let found = table
            .match_request("dev.bugs.ninenines.eu", "/")
            .unwrap();
        assert_eq!(found.host_rest, Some(tokens(&["dev", "bugs"])));
        assert_eq!(found.path_rest, None);

        let found = table.match_request("ninenines.eu", "/").unwrap();
        assert_eq!(found.host_rest, Some(tokens(&[])));

        // A bare rest marker absorbs all labels of any host.
        let mut builder = DispatchTable::builder();
        builder.host("[...]").route("_", "h", ());
        let table = builder.build().unwrap();
        let found = table.match_request("a.b.c.d", "/").unwrap();
        assert_eq!(found.host_rest, Some(tokens(&["a", "b", "c", "d"])));
    }

    #[test]
    fn path_rest() {
        let mut builder = DispatchTable::builder();
        builder.host("_").route("/pathinfo/is/next/[...]", "h", ());
        let table = builder.build().unwrap();

        let found = table
            .match_request("example.com", "/pathinfo/is/next/foo/bar")
            .unwrap();
        assert_eq!(found.path_rest, Some(tokens(&["foo", "bar"])));

        let found = table
            .match_request("example.com", "/pathinfo/is/next")
            .unwrap();
        assert_eq!(found.path_rest, Some(tokens(&[])));

        assert_eq!(
            table.match_request("example.com", "/pathinfo/is").unwrap_err(),
            MatchError::PathNotFound
        );
    }

    #[test]
    fn int_constraint() {
        let mut builder = DispatchTable::builder();
        builder
            .host("_")
            .route_with("/path/:value", [Constraint::int("value")], "h", ());
        let table = builder.build().unwrap();

        let found = table.match_request("example.com", "/path/123").unwrap();
        assert_eq!(found.bindings.get("value"), Some(&BindingValue::Int(123)));

        assert_eq!(
            table.match_request("example.com", "/path/NaN").unwrap_err(),
            MatchError::PathNotFound
        );
    }

    #[test]
    fn repeated_binding_must_agree() {
        let mut builder = DispatchTable::builder();
        builder.host(":same.:same").route("_", "h", ());
        let table = builder.build().unwrap();

        let found = table.match_request("eu.eu", "/").unwrap();
        assert_eq!(found.bindings.get("same"), Some(&BindingValue::from("eu")));

        assert_eq!(
            table.match_request("ninenines.eu", "/").unwrap_err(),
            MatchError::HostNotFound
        );
    }

    #[test]
    fn binding_shared_between_host_and_path() {
        let mut builder = DispatchTable::builder();
        builder.host(":user.ninenines.eu").route("/path/:user", "h", ());
        let table = builder.build().unwrap();

        let found = table.match_request("joe.ninenines.eu", "/path/joe").unwrap();
        assert_eq!(found.bindings.get("user"), Some(&BindingValue::from("joe")));

        assert_eq!(
            table
                .match_request("joe.ninenines.eu", "/path/jane")
                .unwrap_err(),
            MatchError::PathNotFound
        );
    }

    #[test]
    fn asterisk_request_target() {
        let mut builder = DispatchTable::builder();
        builder.host("_").route("*", "options", ());
        let table = builder.build().unwrap();

        let found = table.match_request("example.com", "*").unwrap();
        assert_eq!(*found.handler, "options");
        assert_eq!(found.path_rest, None);

        // Any rule before the asterisk rule forces path splitting, which the
        // `*` request target does not survive.
        let mut builder = DispatchTable::builder();
        builder
            .host("_")
            .route("/a", "a", ())
            .route("*", "options", ());
        let table = builder.build().unwrap();
        assert_eq!(
            table.match_request("example.com", "*").unwrap_err(),
            MatchError::PathBadRequest
        );
    }

    #[test]
    fn malformed_paths() {
        let mut builder = DispatchTable::builder();
        builder.host("_").route("/a", "a", ());
        let table = builder.build().unwrap();

        assert_eq!(
            table.match_request("example.com", "noslash").unwrap_err(),
            MatchError::PathBadRequest
        );
        assert_eq!(
            table.match_request("example.com", "/bad%zz").unwrap_err(),
            MatchError::PathBadRequest
        );

        // A path wildcard accepts the request before the path is ever split.
        let mut builder = DispatchTable::builder();
        builder.host("_").route("_", "any", ());
        let table = builder.build().unwrap();
        assert_eq!(
            *table.match_request("example.com", "noslash").unwrap().handler,
            "any"
        );
    }

    #[test]
    fn percent_decoded_segments() {
        let mut builder = DispatchTable::builder();
        builder.host("_").route("/hello world/:name", "h", ());
        let table = builder.build().unwrap();

        let found = table
            .match_request("example.com", "/hello%20world/a+b")
            .unwrap();
        assert_eq!(found.bindings.get("name"), Some(&BindingValue::from("a b")));
    }

    #[test]
    fn malformed_hosts() {
        // Wildcard host rules accept hosts that cannot be split.
        let mut builder = DispatchTable::builder();
        builder.host("_").route("_", "any", ());
        let table = builder.build().unwrap();
        assert_eq!(
            *table.match_request("bad..host", "/").unwrap().handler,
            "any"
        );

        let mut builder = DispatchTable::builder();
        builder.host("example.com").route("_", "site", ());
        let table = builder.build().unwrap();
        assert_eq!(
            table.match_request("bad..host", "/").unwrap_err(),
            MatchError::HostNotFound
        );
    }

    #[test]
    fn host_constraint_rejection_tries_next_rule() {
        let reject = Constraint::check("sub", |_| ConstraintResult::Reject);
        let mut builder = DispatchTable::builder();
        builder
            .host_with(":sub.example.com", [reject])
            .route("/", "first", ());
        builder.host(":sub.example.com").route("/", "second", ());
        let table = builder.build().unwrap();

        let found = table.match_request("www.example.com", "/").unwrap();
        assert_eq!(*found.handler, "second");
    }

    #[test]
    fn first_matching_host_commits() {
        let mut builder = DispatchTable::builder();
        builder.host("example.com").route("/only/here", "first", ());
        builder.host("example.com").route("/elsewhere", "second", ());
        let table = builder.build().unwrap();

        // The second host rule is never consulted once the first one
        // accepted the host.
        assert_eq!(
            table.match_request("example.com", "/elsewhere").unwrap_err(),
            MatchError::PathNotFound
        );
    }

    #[test]
    fn optional_part_priority() {
        let mut builder = DispatchTable::builder();
        builder.host("_").route("/resource[/:id]", "h", ());
        let table = builder.build().unwrap();

        let found = table.match_request("example.com", "/resource").unwrap();
        assert!(found.bindings.is_empty());

        let found = table.match_request("example.com", "/resource/42").unwrap();
        assert_eq!(found.bindings.get("id"), Some(&BindingValue::from("42")));
    }

    #[test]
    fn pretokenized_input() {
        let mut builder = DispatchTable::builder();
        builder
            .host("ninenines.eu")
            .route("/users/:id", "user", ());
        let table = builder.build().unwrap();

        let host = tokens(&["eu", "ninenines"]);
        let path = tokens(&["users", "42"]);
        let found = table.match_tokens(&host, Some(&path)).unwrap();
        assert_eq!(*found.handler, "user");
        assert_eq!(found.bindings.get("id"), Some(&BindingValue::from("42")));

        assert_eq!(
            table.match_tokens(&host, None).unwrap_err(),
            MatchError::PathBadRequest
        );

        let mut builder = DispatchTable::builder();
        builder.host("_").route("_", "any", ());
        let table = builder.build().unwrap();
        assert_eq!(*table.match_tokens(&host, None).unwrap().handler, "any");
    }

    #[test]
    fn empty_host_and_empty_path() {
        let mut builder = DispatchTable::builder();
        builder.host("").route("/", "empty", ());
        let table = builder.build().unwrap();

        assert_eq!(*table.match_request("", "/").unwrap().handler, "empty");
        assert_eq!(
            table.match_request("example.com", "/").unwrap_err(),
            MatchError::HostNotFound
        );
    }
}
