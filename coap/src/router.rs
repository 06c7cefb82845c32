//! Path based dispatch of inbound requests.
//!
//! A [`Router`] is an [`EndpointHandler`] that picks a [`Resource`] by the
//! request path and method. It answers `4.04 Not Found` for unknown paths,
//! `4.05 Method Not Allowed` for known paths with another method, and lists
//! its paths under `/.well-known/core` and `/`.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use itertools::Itertools;

use crate::endpoint::{Endpoint, EndpointHandler};
use crate::message::{Code, Options};
use crate::transaction::{ResponseState, ServerTransaction};
use crate::transport::incoming::IncomingRequest;

/// Path of the resource discovery listing.
pub const WELL_KNOWN_CORE: &str = "/.well-known/core";

/// Paths answered with the listing when no route claims them.
const LISTING_PATHS: [&str; 3] = [WELL_KNOWN_CORE, "/.well-known/core/", "/"];

/// `application/link-format`
const LINK_FORMAT: u16 = 40;

/// A handler for the requests to one path and method.
///
/// The resource fills in `response`; the router sends it once the
/// resource returns, unless the resource already did. A resource that
/// knows it is slow may [`defer`](ServerTransaction::defer) first.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Handle one request.
    async fn handle(&self, request: &IncomingRequest, response: &mut ServerTransaction);
}

#[async_trait]
impl<F> Resource for F
where
    F: Fn(&IncomingRequest, &mut ServerTransaction) + Send + Sync + 'static,
{
    async fn handle(&self, request: &IncomingRequest, response: &mut ServerTransaction) {
        (self)(request, response)
    }
}

/// Routes requests to resources by path and method.
///
/// # Examples
///
/// ```
/// # use coap::Router;
/// # use coap::transaction::ServerTransaction;
/// # use coap::transport::incoming::IncomingRequest;
/// let router = Router::new()
///     .get("/one", |_: &IncomingRequest, response: &mut ServerTransaction| {
///         response.set_payload("ONE!!!");
///     });
/// ```
#[derive(Default)]
pub struct Router {
    routes: BTreeMap<String, HashMap<Code, Box<dyn Resource>>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `resource` for `method` requests to `path`.
    ///
    /// Paths compare as rebuilt from the request options, so `path` is
    /// normalized the same way: `"one"` and `"/one"` are the same route.
    pub fn route(mut self, method: Code, path: &str, resource: impl Resource) -> Self {
        let mut options = Options::new();
        let path = match options.set_path(path) {
            Ok(()) => options.path().unwrap_or_else(|| "/".to_string()),
            Err(_) => path.to_string(),
        };

        self.routes
            .entry(path)
            .or_default()
            .insert(method, Box::new(resource));

        self
    }

    pub fn get(self, path: &str, resource: impl Resource) -> Self {
        self.route(Code::GET, path, resource)
    }

    pub fn post(self, path: &str, resource: impl Resource) -> Self {
        self.route(Code::POST, path, resource)
    }

    pub fn put(self, path: &str, resource: impl Resource) -> Self {
        self.route(Code::PUT, path, resource)
    }

    pub fn delete(self, path: &str, resource: impl Resource) -> Self {
        self.route(Code::DELETE, path, resource)
    }

    /// The resource listing in link-format, e.g. `</one>,</two>`.
    pub fn link_format(&self) -> String {
        self.routes
            .keys()
            .filter(|path| !LISTING_PATHS.contains(&path.as_str()))
            .map(|path| format!("<{path}>"))
            .join(",")
    }

    async fn dispatch(&self, request: &IncomingRequest, response: &mut ServerTransaction) {
        let path = request.path().unwrap_or_else(|| "/".to_string());

        match self.routes.get(&path) {
            Some(methods) => match methods.get(&request.code) {
                Some(resource) => resource.handle(request, response).await,
                None => response.set_code(Code::METHOD_NOT_ALLOWED),
            },
            None if LISTING_PATHS.contains(&path.as_str()) => {
                if request.code == Code::GET {
                    response.options_mut().set_content_format(LINK_FORMAT);
                    response.set_payload(self.link_format());
                } else {
                    response.set_code(Code::METHOD_NOT_ALLOWED);
                    response.set_payload("Method not allowed");
                }
            }
            None => {
                response.set_code(Code::NOT_FOUND);
                response.set_payload("Not Found");
            }
        }
    }
}

#[async_trait]
impl EndpointHandler for Router {
    async fn handle(&self, request: IncomingRequest, mut response: ServerTransaction, _: &Endpoint) {
        log::trace!(
            "Routing {} {} from /{}",
            request.code,
            request.path().unwrap_or_default(),
            request.source()
        );

        self.dispatch(&request, &mut response).await;

        if let Ok(ResponseState::New | ResponseState::Deferred) = response.state()
            && let Err(err) = response.send().await
        {
            log::warn!("Failed to answer /{}: {}", request.source(), err);
        }
    }
}
