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

//! Handler selecting a route for the current request.

use log::{debug, trace};
use pattern_router::{Bindings, Constraint, DispatchTable, MatchError, Token};
use pingora::proxy::Session;
use pingora::{Error, ErrorType};
use std::borrow::Cow;

use crate::configuration::{ConstraintEntryConf, DispatchConf};

/// Free-form options attached to a route in the configuration
pub type HandlerOpts = serde_yaml::Value;

/// The dispatch decision for a single request
///
/// This is what downstream processing receives: which handler is responsible
/// for the request, with which options, and the values extracted from the
/// host and path while matching.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteState {
    /// Name of the handler responsible for the request
    pub handler: String,

    /// Options of the matched route
    pub opts: HandlerOpts,

    /// Variables captured from the host and path patterns
    pub bindings: Bindings,

    /// Host labels absorbed by a trailing host wildcard, leftmost label
    /// first
    pub host_rest: Option<Vec<Token>>,

    /// Path segments absorbed by a trailing path wildcard
    pub path_rest: Option<Vec<Token>>,
}

/// Handler routing requests via the compiled dispatch table
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchHandler {
    table: DispatchTable<String, HandlerOpts>,
}

fn constraint_list(conf: &[ConstraintEntryConf]) -> Vec<Constraint> {
    conf.iter().map(ConstraintEntryConf::to_constraint).collect()
}

impl TryFrom<DispatchConf> for DispatchHandler {
    type Error = Box<Error>;

    fn try_from(conf: DispatchConf) -> Result<Self, Self::Error> {
        debug!("Dispatch configuration received: {conf:#?}");

        let mut builder = DispatchTable::builder();
        for host_conf in conf.routes {
            let host = builder.host_with(&host_conf.host, constraint_list(&host_conf.constraints));
            for path_conf in host_conf.paths {
                host.route_with(
                    &path_conf.path,
                    constraint_list(&path_conf.constraints),
                    path_conf.handler,
                    path_conf.opts,
                );
            }
        }

        let table = builder.build().map_err(|err| {
            Error::because(
                ErrorType::InternalError,
                "failed compiling the routing table",
                err,
            )
        })?;
        Ok(Self { table })
    }
}

impl DispatchHandler {
    /// The compiled routing table.
    pub fn table(&self) -> &DispatchTable<String, HandlerOpts> {
        &self.table
    }

    /// Selects the route for the current request.
    ///
    /// On success the dispatch decision is returned, to be stored in the
    /// request context for downstream phases. Requests matching no route
    /// produce an error carrying the response status: 400 for an unknown
    /// host or a malformed path, 404 for a known host without a matching
    /// path.
    pub fn dispatch(&self, session: &Session) -> Result<RouteState, Box<Error>> {
        let host = request_host(session).unwrap_or(Cow::Borrowed(""));
        let host = strip_port(&host);
        let path = session.req_header().uri.path();
        trace!("Dispatching request for host {host} and path {path}");

        match self.table.match_request(host, path) {
            Ok(found) => {
                trace!(
                    "Request handled by {} with bindings {:?}",
                    found.handler,
                    found.bindings
                );
                Ok(RouteState {
                    handler: found.handler.clone(),
                    opts: found.opts.clone(),
                    bindings: found.bindings,
                    host_rest: found.host_rest,
                    path_rest: found.path_rest,
                })
            }
            Err(err) => {
                debug!("No route for host {host} and path {path}: {err}");
                Err(match err {
                    MatchError::HostNotFound => {
                        Error::explain(ErrorType::HTTPStatus(400), "no route for the request host")
                    }
                    MatchError::PathBadRequest => {
                        Error::explain(ErrorType::HTTPStatus(400), "malformed request path")
                    }
                    MatchError::PathNotFound => {
                        Error::explain(ErrorType::HTTPStatus(404), "no route for the request path")
                    }
                })
            }
        }
    }
}

/// Attempts to determine the request host if one was specified.
fn request_host(session: &Session) -> Option<Cow<'_, str>> {
    if let Some(host) = session.req_header().headers.get("host") {
        return host.to_str().ok().map(Cow::Borrowed);
    }

    let uri = &session.req_header().uri;
    let host = uri.host()?;
    if let Some(port) = uri.port() {
        let mut host = host.to_owned();
        host.push(':');
        host.push_str(port.as_str());
        Some(Cow::Owned(host))
    } else {
        Some(Cow::Borrowed(host))
    }
}

/// Removes the port from a host name, leaving bracketed IPv6 addresses
/// intact.
fn strip_port(host: &str) -> &str {
    match host.rfind(':') {
        Some(index) if !host[index..].contains(']') => &host[..index],
        _ => host,
    }
}
