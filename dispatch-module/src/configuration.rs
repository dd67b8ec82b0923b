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

//! Structures required to deserialize Dispatch Module configuration from
//! YAML configuration files.

use pattern_router::Constraint;
use pingora::{Error, ErrorType};
use serde::Deserialize;

/// Check applied to a variable captured from a route pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintConf {
    /// The captured value has to parse as a decimal integer and is replaced
    /// by the parsed number
    Int,
    /// The captured value has to be non-empty
    NonEmpty,
}

/// A single constraint of a route
///
/// Constraints are applied in the configured order, several constraints can
/// name the same binding.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConstraintEntryConf {
    /// Name of the binding the check applies to
    pub name: String,

    /// The check to apply to the captured value
    pub check: ConstraintConf,
}

impl ConstraintEntryConf {
    pub(crate) fn to_constraint(&self) -> Constraint {
        match self.check {
            ConstraintConf::Int => Constraint::int(&self.name),
            ConstraintConf::NonEmpty => Constraint::non_empty(&self.name),
        }
    }
}

/// A single path route within a host
#[derive(Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PathRouteConf {
    /// Path pattern, e.g. `/users/:id` or `/static/[...]`. The pattern `_`
    /// matches any path, `*` matches the literal `*` request target of
    /// `OPTIONS` requests.
    pub path: String,

    /// Constraints on the names captured by the path pattern, applied in
    /// the configured order
    pub constraints: Vec<ConstraintEntryConf>,

    /// Name of the handler responsible for this route
    pub handler: String,

    /// Free-form options made available to the handler
    pub opts: serde_yaml::Value,
}

impl Default for PathRouteConf {
    fn default() -> Self {
        Self {
            path: "_".to_owned(),
            constraints: Vec::new(),
            handler: String::new(),
            opts: serde_yaml::Value::Null,
        }
    }
}

/// The path routes of a single host pattern
#[derive(Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct HostRouteConf {
    /// Host pattern, e.g. `example.com` or `[...].example.com`. The pattern
    /// `_` matches any host.
    pub host: String,

    /// Constraints on the names captured by the host pattern, applied in
    /// the configured order
    pub constraints: Vec<ConstraintEntryConf>,

    /// Path routes tried in the configured order
    pub paths: Vec<PathRouteConf>,
}

impl Default for HostRouteConf {
    fn default() -> Self {
        Self {
            host: "_".to_owned(),
            constraints: Vec::new(),
            paths: Vec::new(),
        }
    }
}

/// Configuration file settings of the dispatch module
#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DispatchConf {
    /// Host rules tried in the configured order
    pub routes: Vec<HostRouteConf>,
}

impl DispatchConf {
    /// Parses configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, Box<Error>> {
        serde_yaml::from_str(text).map_err(|err| {
            Error::because(ErrorType::ReadError, "failed parsing configuration", err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    #[test]
    fn deserialization() {
        let conf = DispatchConf::from_yaml(
            r#"
                routes:
                - host: ":sub.example.com"
                  constraints:
                  - name: sub
                    check: non_empty
                  paths:
                  - path: /users/:id
                    constraints:
                    - name: id
                      check: non_empty
                    - name: id
                      check: int
                    handler: user
                    opts:
                      greeting: hello
                - host: _
                  paths:
                  - handler: fallback
            "#,
        )
        .unwrap();

        assert_eq!(conf.routes.len(), 2);

        let host = &conf.routes[0];
        assert_eq!(host.host, ":sub.example.com");
        assert_eq!(
            host.constraints,
            vec![ConstraintEntryConf {
                name: "sub".to_owned(),
                check: ConstraintConf::NonEmpty,
            }]
        );
        assert_eq!(host.paths.len(), 1);
        assert_eq!(host.paths[0].path, "/users/:id");

        // Constraints keep the configured order, checks on the same binding
        // run one after another.
        assert_eq!(
            host.paths[0].constraints,
            vec![
                ConstraintEntryConf {
                    name: "id".to_owned(),
                    check: ConstraintConf::NonEmpty,
                },
                ConstraintEntryConf {
                    name: "id".to_owned(),
                    check: ConstraintConf::Int,
                },
            ]
        );
        assert_eq!(host.paths[0].handler, "user");

        let fallback = &conf.routes[1];
        assert_eq!(fallback.host, "_");
        assert_eq!(fallback.paths[0].path, "_");
        assert_eq!(fallback.paths[0].opts, serde_yaml::Value::Null);
    }

    #[test]
    fn empty_configuration() {
        let conf = DispatchConf::from_yaml("routes: []").unwrap();
        assert_eq!(conf, DispatchConf::default());
    }

    #[test]
    fn invalid_configuration() {
        assert!(DispatchConf::from_yaml("routes: 12").is_err());
        assert!(DispatchConf::from_yaml(
            r#"
                routes:
                - paths:
                  - constraints:
                    - name: id
                      check: unknown
            "#
        )
        .is_err());
    }
}
