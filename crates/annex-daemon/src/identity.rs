//! Local identity resolution
//!
//! Findings are published under the canonical name of the host that ran the
//! pass. Name lookups on freshly booted hosts often fail transiently, so the
//! lookup is retried a bounded number of times.

use crate::config::IdentityConfig;
use crate::error::IdentityError;
use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::time::Duration;

/// Resolved identity of the local host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub hostname: String,
    pub addresses: Vec<IpAddr>,
}

/// Host name resolution with bounded retry
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    max_attempts: u32,
    retry_delay: Duration,
    lookup_timeout: Duration,
}

impl IdentityResolver {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
            lookup_timeout: Duration::from_secs(5),
        }
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_secs(config.retry_delay_secs))
            .with_lookup_timeout(Duration::from_secs(config.lookup_timeout_secs.max(1)))
    }

    /// Bound on a single lookup; an expired lookup counts as transient
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Resolve `host` through the system resolver
    pub async fn resolve(&self, host: &str) -> Result<LocalIdentity, IdentityError> {
        self.resolve_with(host, system_lookup).await
    }

    /// Resolve `host` with a caller-supplied lookup.
    ///
    /// Only transient failures are retried; anything else fails at once.
    pub async fn resolve_with<F, Fut>(&self, host: &str, lookup: F) -> Result<LocalIdentity, IdentityError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = io::Result<Vec<IpAddr>>>,
    {
        for attempt in 1..=self.max_attempts {
            let outcome = tokio::time::timeout(self.lookup_timeout, lookup(host.to_string()))
                .await
                .unwrap_or_else(|_| {
                    Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("lookup timed out after {}s", self.lookup_timeout.as_secs()),
                    ))
                });

            match outcome {
                Ok(addresses) if !addresses.is_empty() => {
                    tracing::debug!(host, attempt, ?addresses, "Resolved local identity");
                    return Ok(LocalIdentity {
                        hostname: host.to_string(),
                        addresses,
                    });
                }
                Ok(_) => {
                    return Err(IdentityError::Lookup {
                        host: host.to_string(),
                        reason: "no addresses returned".to_string(),
                    });
                }
                Err(e) if is_transient(&e) => {
                    tracing::warn!(
                        host,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Transient lookup failure"
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
                Err(e) => {
                    return Err(IdentityError::Lookup {
                        host: host.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Err(IdentityError::Exhausted {
            host: host.to_string(),
            attempts: self.max_attempts,
        })
    }
}

async fn system_lookup(host: String) -> io::Result<Vec<IpAddr>> {
    let addrs = tokio::net::lookup_host((host.as_str(), 0)).await?;
    Ok(addrs.map(|a| a.ip()).collect())
}

/// Whether a resolver error is worth retrying
pub fn is_transient(e: &io::Error) -> bool {
    if matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    ) {
        return true;
    }
    // EAI_AGAIN reaches us only as resolver message text
    let message = e.to_string().to_ascii_lowercase();
    message.contains("temporary failure") || message.contains("try again")
}

/// Host name to resolve: configured, then `HOSTNAME`, then the kernel's
pub fn local_hostname(config: &IdentityConfig) -> String {
    let candidates = [
        config.hostname.clone(),
        std::env::var("HOSTNAME").ok(),
        std::fs::read_to_string("/proc/sys/kernel/hostname").ok(),
    ];
    candidates
        .into_iter()
        .flatten()
        .map(|h| h.trim().to_string())
        .find(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> io::Error {
        io::Error::new(io::ErrorKind::Other, "Temporary failure in name resolution")
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let resolver = IdentityResolver::new(20, Duration::from_secs(3));

        let counter = calls.clone();
        let started = tokio::time::Instant::now();
        let identity = resolver
            .resolve_with("submit.pool.example", move |_| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(transient())
                    } else {
                        Ok(vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))])
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(identity.hostname, "submit.pool.example");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_cap() {
        let calls = Arc::new(AtomicU32::new(0));
        let resolver = IdentityResolver::new(20, Duration::from_secs(3));

        let counter = calls.clone();
        let err = resolver
            .resolve_with("flaky", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<Vec<IpAddr>, _>(transient()) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, IdentityError::Exhausted { attempts: 20, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let resolver = IdentityResolver::new(20, Duration::from_secs(3));

        let counter = calls.clone();
        let err = resolver
            .resolve_with("nosuchhost", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<Vec<IpAddr>, _>(io::Error::new(io::ErrorKind::Other, "Name or service not known")) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, IdentityError::Lookup { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_lookup_times_out_and_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let resolver =
            IdentityResolver::new(3, Duration::from_secs(3)).with_lookup_timeout(Duration::from_secs(5));

        let counter = calls.clone();
        let started = tokio::time::Instant::now();
        let err = resolver
            .resolve_with("hung.resolver", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<io::Result<Vec<IpAddr>>>()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, IdentityError::Exhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(21));
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&transient()));
        assert!(is_transient(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::NotFound)));
    }

    #[test]
    fn test_configured_hostname_wins() {
        let config = IdentityConfig {
            hostname: Some(" submit-1 \n".into()),
            ..Default::default()
        };
        assert_eq!(local_hostname(&config), "submit-1");
    }
}
