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

//! # Dispatch Module for pingora servers
//!
//! This module selects a named handler for each incoming request by matching
//! the request host and path against configured route patterns. The routes
//! come from the server's YAML configuration:
//!
//! ```yaml
//! routes:
//! - host: "[...].example.com"
//!   paths:
//!   - path: /users/:id
//!     constraints:
//!     - name: id
//!       check: int
//!     handler: user
//!   - path: /static/[...]
//!     handler: static_files
//!     opts:
//!       root: /var/www
//! - host: _
//!   paths:
//!   - path: _
//!     handler: not_configured
//! ```
//!
//! During the `request_filter` phase the server calls
//! [`DispatchHandler::dispatch`] and stores the returned [`RouteState`] in
//! its per-request context, where downstream phases find the handler name,
//! the route options and the variables captured from the host and path.
//! Requests matching no route produce a pingora error carrying the response
//! status, 400 for an unknown host or a malformed path and 404 for a known
//! host without a matching path.
//!
//! ```rust
//! use dispatch_module::{DispatchConf, DispatchHandler};
//!
//! let conf = DispatchConf::from_yaml(
//!     r#"
//!         routes:
//!         - host: example.com
//!           paths:
//!           - path: /
//!             handler: index
//!     "#,
//! )
//! .unwrap();
//! let handler: DispatchHandler = conf.try_into().unwrap();
//! assert!(handler
//!     .table()
//!     .match_request("example.com", "/")
//!     .is_ok());
//! ```

mod configuration;
mod handler;

pub use configuration::{
    ConstraintConf, ConstraintEntryConf, DispatchConf, HostRouteConf, PathRouteConf,
};
pub use handler::{DispatchHandler, HandlerOpts, RouteState};
