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

//! # Host/path pattern routing
//!
//! This crate selects a handler for a request by matching its host and path
//! against a table of textual patterns, compiled once at startup. Patterns
//! can capture named variables, match arbitrary subdomains or path suffixes
//! and declare optional parts; captured variables can be restricted by
//! constraints.
//!
//! ```rust
//! use pattern_router::{Constraint, DispatchTable};
//!
//! let mut builder = DispatchTable::builder();
//! builder
//!     .host("[...].ninenines.eu")
//!     .route("/", "index", ())
//!     .route_with("/users/:id", [Constraint::int("id")], "user", ());
//! builder.host("_").route("_", "not_configured", ());
//! let table = builder.build().unwrap();
//!
//! let found = table.match_request("www.ninenines.eu", "/users/42").unwrap();
//! assert_eq!(*found.handler, "user");
//! assert_eq!(found.bindings.get("id").and_then(|value| value.as_int()), Some(42));
//! assert_eq!(found.host_rest.as_deref(), Some(&[b"www".to_vec()][..]));
//!
//! let found = table.match_request("example.com", "/anything").unwrap();
//! assert_eq!(*found.handler, "not_configured");
//! ```
//!
//! Routes are matched in the order they were added, the first match wins.
//! The compiled table performs no I/O, holds no locks and can be shared
//! freely between request handling threads.
//!
//! Match failures are classified, so that callers can distinguish an unknown
//! host or a malformed path (both usually reported as 400) from a known host
//! without a matching path (404).

mod constraints;
mod matcher;
mod pattern;
mod split;
mod table;

pub use constraints::{BindingValue, Constraint, ConstraintResult};
pub use matcher::{Bindings, MatchError, RouteMatch};
pub use pattern::{CompileError, HostPattern, PathPattern, Segment};
pub use split::{split_host, split_path, Token};
pub use table::{DispatchTable, DispatchTableBuilder, HostRoutes};
