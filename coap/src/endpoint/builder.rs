use std::sync::atomic::AtomicU16;
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::watch;
use utils::DnsResolver;

use super::{Endpoint, EndpointConfig, EndpointHandler};
use crate::endpoint::EndpointInner;
use crate::transaction::TransactionManager;

/// EndpointBuilder for creating a new CoAP `Endpoint`.
pub struct EndpointBuilder {
    name: String,
    config: EndpointConfig,
    resolver: Option<DnsResolver>,
    handler: Option<Box<dyn EndpointHandler>>,
}

impl EndpointBuilder {
    /// Creates a new default instance of `EndpointBuilder` to
    /// construct a `Endpoint`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use coap::*;
    /// let endpoint = endpoint::EndpointBuilder::new()
    ///     .with_name("My Endpoint")
    ///     .build();
    /// ```
    pub fn new() -> Self {
        EndpointBuilder {
            name: String::new(),
            config: EndpointConfig::default(),
            resolver: None,
            handler: None,
        }
    }

    /// Sets the endpoint name.
    pub fn with_name<T: AsRef<str>>(mut self, s: T) -> Self {
        self.name = s.as_ref().to_string();

        self
    }

    /// Sets the handler of inbound requests.
    ///
    /// Without a handler every request is answered with
    /// `5.01 Not Implemented`.
    pub fn with_handler(mut self, handler: impl EndpointHandler) -> Self {
        self.handler = Some(Box::new(handler));

        self
    }

    /// Overrides the default timeouts and limits.
    pub fn with_config(mut self, config: EndpointConfig) -> Self {
        self.config = config;

        self
    }

    /// Sets the resolver used for host names.
    ///
    /// By default the system configuration is read on first use.
    pub fn with_resolver(mut self, resolver: DnsResolver) -> Self {
        self.resolver = Some(resolver);

        self
    }

    /// Finalize the EndpointBuilder into a `Endpoint`.
    pub fn build(self) -> Endpoint {
        log::trace!("Creating endpoint {}...", self.name);

        let resolver = OnceLock::new();
        if let Some(dns) = self.resolver {
            let _ = resolver.set(dns);
        }
        let (shutdown, _) = watch::channel(false);

        Endpoint {
            inner: Arc::new(EndpointInner {
                transactions: TransactionManager::new(
                    self.config.response_lifetime,
                    self.config.response_cache_capacity,
                ),
                transport: Mutex::new(None),
                name: self.name,
                config: self.config,
                resolver,
                handler: self.handler,
                next_message_id: AtomicU16::new(rand::random()),
                shutdown,
            }),
        }
    }
}

impl Default for EndpointBuilder {
    fn default() -> Self {
        Self::new()
    }
}
