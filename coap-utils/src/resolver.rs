//! DNS resolve with the `DnsResolver` type.

use std::io;
use std::net::IpAddr;

use hickory_resolver::config::ResolverConfig;
use hickory_resolver::lookup_ip::LookupIp;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::{IntoName, ResolveError, Resolver, TokioResolver};

/// A DNS resolver backed by [hickory-dns](https://github.com/hickory-dns/hickory-dns).
pub struct DnsResolver {
    dns_resolver: TokioResolver,
}

impl DnsResolver {
    /// Lookup IP addresses for a host.
    pub async fn lookup_ip(
        &self,
        host: impl IntoName,
    ) -> std::result::Result<LookupIp, ResolveError> {
        self.dns_resolver.lookup_ip(host).await
    }

    /// Resolve a single address.
    ///
    /// Address literals are returned as is, without any lookup.
    pub async fn resolve(&self, host: &str) -> Result<IpAddr, io::Error> {
        if let Some(ip) = parse_ip_literal(host) {
            return Ok(ip);
        }
        self.lookup_ip(host)
            .await
            .map_err(|err| io::Error::other(format!("Failed to lookup DNS: {}", err)))?
            .iter()
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("No address found for {host}"),
                )
            })
    }

}

impl Default for DnsResolver {
    fn default() -> Self {
        // Fall back to the public defaults when the system configuration
        // cannot be read.
        let builder = Resolver::builder_tokio().unwrap_or_else(|_| {
            Resolver::builder_with_config(
                ResolverConfig::default(),
                TokioConnectionProvider::default(),
            )
        });
        Self {
            dns_resolver: builder.build(),
        }
    }
}

/// Parses `host` as an IP address literal.
///
/// IPv6 literals may be enclosed in brackets.
pub fn parse_ip_literal(host: &str) -> Option<IpAddr> {
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    host.parse().ok()
}
