//! Startup check of outbound name resolution

use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{HostLookup, Resolver, SystemLookup, UpstreamLookup};

/// Host looked up to decide whether resolution works
pub const PROBE_HOST: &str = "www.google.com";

/// Public DNS servers tried in order when the system resolver fails
pub const DNS_CANDIDATES: [Ipv4Addr; 6] = [
    Ipv4Addr::new(1, 1, 1, 1),
    Ipv4Addr::new(1, 0, 0, 1),
    Ipv4Addr::new(208, 67, 222, 222),
    Ipv4Addr::new(208, 67, 220, 220),
    Ipv4Addr::new(8, 8, 8, 8),
    Ipv4Addr::new(8, 8, 4, 4),
];

const DNS_PORT: u16 = 53;

type UpstreamFactory = Arc<dyn Fn(SocketAddr) -> Arc<dyn HostLookup> + Send + Sync>;

/// Outcome of one resolver attempt
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProbeResult {
    /// The system resolver answered
    NativeOk,
    /// A fallback DNS server answered
    FallbackOk,
    /// A fallback DNS server did not answer
    FallbackFailed,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Attempt {
    /// `None` for the system resolver
    pub server: Option<SocketAddr>,
    pub result: ProbeResult,
}

/// What the probe settled on
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub resolver: Resolver,
    pub attempts: Vec<Attempt>,
}

impl ProbeReport {
    /// Whether the returned resolver answered the probe lookup
    pub fn is_healthy(&self) -> bool {
        self.attempts
            .last()
            .is_some_and(|a| a.result != ProbeResult::FallbackFailed)
    }
}

/// Verifies host name resolution and repairs it with a fallback server
pub struct Prober {
    host: String,
    candidates: Vec<SocketAddr>,
    system: Arc<dyn HostLookup>,
    upstream: UpstreamFactory,
}

impl Prober {
    pub fn new() -> Self {
        Self {
            host: PROBE_HOST.to_string(),
            candidates: DNS_CANDIDATES
                .iter()
                .map(|ip| SocketAddr::new(IpAddr::V4(*ip), DNS_PORT))
                .collect(),
            system: Arc::new(SystemLookup),
            upstream: Arc::new(|server| -> Arc<dyn HostLookup> {
                Arc::new(UpstreamLookup::new(server))
            }),
        }
    }

    /// Replace how lookups are performed
    pub fn with_lookups(
        mut self,
        system: Arc<dyn HostLookup>,
        upstream: impl Fn(SocketAddr) -> Arc<dyn HostLookup> + Send + Sync + 'static,
    ) -> Self {
        self.system = system;
        self.upstream = Arc::new(upstream);
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<SocketAddr>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Run the probe once.
    ///
    /// Never fails: when no server answers, the last candidate's resolver is
    /// returned and the caller carries on with it.
    pub async fn probe(&self) -> ProbeReport {
        if let Some(addrs) = self.try_lookup(self.system.as_ref()).await {
            info!(host = %self.host, ?addrs, "DNS resolver OK");
            return ProbeReport {
                resolver: Resolver::from_lookup(self.system.clone(), None),
                attempts: vec![Attempt {
                    server: None,
                    result: ProbeResult::NativeOk,
                }],
            };
        }

        warn!(host = %self.host, "system resolver returned no addresses");

        let mut resolver = Resolver::from_lookup(self.system.clone(), None);
        let mut attempts = Vec::with_capacity(self.candidates.len());

        for server in &self.candidates {
            let lookup = (self.upstream)(*server);
            resolver = Resolver::from_lookup(lookup.clone(), Some(*server));

            if let Some(addrs) = self.try_lookup(lookup.as_ref()).await {
                info!(%server, ?addrs, "new DNS resolver OK");
                attempts.push(Attempt {
                    server: Some(*server),
                    result: ProbeResult::FallbackOk,
                });
                return ProbeReport { resolver, attempts };
            }

            warn!(%server, "new DNS resolver failed");
            attempts.push(Attempt {
                server: Some(*server),
                result: ProbeResult::FallbackFailed,
            });
        }

        error!(
            host = %self.host,
            upstream = ?resolver.upstream(),
            "no DNS server could resolve the probe host, continuing anyway"
        );
        ProbeReport { resolver, attempts }
    }

    /// Addresses for the probe host, `None` when the answer is empty or an error
    async fn try_lookup(&self, lookup: &dyn HostLookup) -> Option<Vec<IpAddr>> {
        match lookup.lookup(&self.host).await {
            Ok(addrs) if !addrs.is_empty() => Some(addrs),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(host = %self.host, error = %e, "lookup failed");
                None
            }
        }
    }
}

impl Default for Prober {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::LookupError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers from a fixed table and records every lookup
    struct FakeLookup {
        answer: Vec<IpAddr>,
        fail: bool,
        name: Option<SocketAddr>,
        contacted: Arc<Mutex<Vec<Option<SocketAddr>>>>,
    }

    #[async_trait]
    impl HostLookup for FakeLookup {
        async fn lookup(&self, _host: &str) -> Result<Vec<IpAddr>, LookupError> {
            self.contacted.lock().unwrap().push(self.name);
            if self.fail {
                return Err(LookupError::System(std::io::Error::other("no route")));
            }
            Ok(self.answer.clone())
        }
    }

    fn addr(last: u8) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)), 53)
    }

    fn answer() -> Vec<IpAddr> {
        vec![IpAddr::V4(Ipv4Addr::new(142, 250, 0, 1))]
    }

    /// Prober whose system lookup yields `native` and whose upstream
    /// servers answer only if listed in `working`
    fn fake_prober(
        native: Vec<IpAddr>,
        working: Vec<SocketAddr>,
        candidates: Vec<SocketAddr>,
    ) -> (Prober, Arc<Mutex<Vec<Option<SocketAddr>>>>) {
        let contacted = Arc::new(Mutex::new(Vec::new()));
        let system = Arc::new(FakeLookup {
            fail: native.is_empty(),
            answer: native,
            name: None,
            contacted: contacted.clone(),
        });
        let log = contacted.clone();
        let prober = Prober::new()
            .with_candidates(candidates)
            .with_lookups(system, move |server| {
                let ok = working.contains(&server);
                Arc::new(FakeLookup {
                    answer: if ok { answer() } else { Vec::new() },
                    fail: false,
                    name: Some(server),
                    contacted: log.clone(),
                })
            });
        (prober, contacted)
    }

    #[test]
    fn test_default_candidates_order() {
        let prober = Prober::new();
        assert_eq!(prober.candidates.len(), 6);
        assert_eq!(prober.candidates[0], "1.1.1.1:53".parse().unwrap());
        assert_eq!(prober.candidates[5], "8.8.4.4:53".parse().unwrap());
        assert_eq!(prober.host, "www.google.com");
    }

    #[tokio::test]
    async fn test_native_ok_installs_nothing() {
        let (prober, contacted) = fake_prober(answer(), vec![addr(1)], vec![addr(1), addr(2)]);

        let report = prober.probe().await;

        assert_eq!(report.resolver.upstream(), None);
        assert_eq!(
            report.attempts,
            vec![Attempt {
                server: None,
                result: ProbeResult::NativeOk,
            }]
        );
        assert_eq!(*contacted.lock().unwrap(), vec![None]);
        assert!(report.is_healthy());
    }

    #[tokio::test]
    async fn test_stops_at_first_working_candidate() {
        let candidates = vec![addr(1), addr(2), addr(3), addr(4)];
        let (prober, contacted) = fake_prober(Vec::new(), vec![addr(2), addr(3)], candidates);

        let report = prober.probe().await;

        assert_eq!(report.resolver.upstream(), Some(addr(2)));
        assert_eq!(
            report.attempts.iter().map(|a| a.result).collect::<Vec<_>>(),
            vec![ProbeResult::FallbackFailed, ProbeResult::FallbackOk]
        );
        assert_eq!(
            *contacted.lock().unwrap(),
            vec![None, Some(addr(1)), Some(addr(2))]
        );
        assert!(report.is_healthy());
    }

    #[tokio::test]
    async fn test_all_candidates_fail_keeps_last() {
        let (prober, contacted) =
            fake_prober(Vec::new(), Vec::new(), vec![addr(1), addr(2), addr(3)]);

        let report = prober.probe().await;

        assert_eq!(report.resolver.upstream(), Some(addr(3)));
        assert_eq!(report.attempts.len(), 3);
        assert!(report
            .attempts
            .iter()
            .all(|a| a.result == ProbeResult::FallbackFailed));
        assert_eq!(contacted.lock().unwrap().len(), 4);
        assert!(!report.is_healthy());
    }

    #[tokio::test]
    async fn test_no_candidates_keeps_system_resolver() {
        let (prober, _) = fake_prober(Vec::new(), Vec::new(), Vec::new());

        let report = prober.probe().await;

        assert_eq!(report.resolver.upstream(), None);
        assert!(report.attempts.is_empty());
        assert!(!report.is_healthy());
    }

    #[tokio::test]
    async fn test_resolver_uses_selected_lookup() {
        let (prober, contacted) = fake_prober(Vec::new(), vec![addr(1)], vec![addr(1)]);
        let report = prober.probe().await;

        let ips = report.resolver.lookup_host("example.org").await.unwrap();

        assert_eq!(ips, answer());
        assert_eq!(contacted.lock().unwrap().last(), Some(&Some(addr(1))));
    }
}
