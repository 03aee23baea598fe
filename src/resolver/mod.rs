//! Host name resolution
//!
//! Name lookups go through an explicit [`Resolver`] handle instead of
//! process-wide state. At startup the [`Prober`] checks that the operating
//! system resolver works and, when it does not, hands back a resolver bound
//! to a public DNS server. Components that need lookups receive a clone of
//! that handle.

mod probe;

pub use probe::{Attempt, ProbeReport, ProbeResult, Prober, DNS_CANDIDATES, PROBE_HOST};

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

/// Error type for lookups
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("system resolver: {0}")]
    System(#[from] std::io::Error),

    #[error("upstream resolver: {0}")]
    Upstream(#[from] hickory_resolver::error::ResolveError),
}

/// Something that can map a host name to addresses
#[async_trait]
pub trait HostLookup: Send + Sync {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, LookupError>;
}

/// The operating system resolver
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLookup;

#[async_trait]
impl HostLookup for SystemLookup {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, LookupError> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Queries one DNS server directly over UDP
pub struct UpstreamLookup {
    inner: TokioAsyncResolver,
}

impl UpstreamLookup {
    pub fn new(server: SocketAddr) -> Self {
        let mut config = ResolverConfig::new();
        config.add_name_server(NameServerConfig::new(server, Protocol::Udp));

        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(5);
        opts.attempts = 1;

        Self {
            inner: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

#[async_trait]
impl HostLookup for UpstreamLookup {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, LookupError> {
        let response = self.inner.lookup_ip(host).await?;
        Ok(response.iter().collect())
    }
}

/// Cloneable resolver handle threaded into components that resolve names
#[derive(Clone)]
pub struct Resolver {
    lookup: Arc<dyn HostLookup>,
    upstream: Option<SocketAddr>,
}

impl Resolver {
    /// Resolver backed by the operating system
    pub fn system() -> Self {
        Self {
            lookup: Arc::new(SystemLookup),
            upstream: None,
        }
    }

    pub(crate) fn from_lookup(lookup: Arc<dyn HostLookup>, upstream: Option<SocketAddr>) -> Self {
        Self { lookup, upstream }
    }

    /// DNS server this resolver is pinned to, `None` for the system resolver
    pub fn upstream(&self) -> Option<SocketAddr> {
        self.upstream
    }

    pub async fn lookup_host(&self, host: &str) -> Result<Vec<IpAddr>, LookupError> {
        self.lookup.lookup(host).await
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("upstream", &self.upstream)
            .finish()
    }
}

impl reqwest::dns::Resolve for Resolver {
    fn resolve(&self, name: reqwest::dns::Name) -> reqwest::dns::Resolving {
        let resolver = self.clone();
        Box::pin(async move {
            let ips = resolver.lookup_host(name.as_str()).await?;
            let addrs: reqwest::dns::Addrs =
                Box::new(ips.into_iter().map(|ip| SocketAddr::new(ip, 0)));
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(addrs)
        })
    }
}
