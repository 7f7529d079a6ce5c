//! Secondary ("slave") server management.
//!
//! The [`SlaveRegistry`] serves two purposes: it is the whitelist consulted for every inbound
//! transfer connection, and the target list for [NOTIFY][crate::dns::notify] pushes.
//!
//! Registries are immutable once built. Changing the set of slaves means
//! [resolving][resolve_all] a new list of [`SlaveDescriptor`]s and swapping the whole registry,
//! see [`ZoneServer::set_slaves`][crate::dns::server::ZoneServer::set_slaves].

use crate::error::Error;
use futures_util::future::try_join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;

pub mod descriptor;

pub use descriptor::SlaveDescriptor;

/// A resolved secondary server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slave {
    /// The configured host, used as-is when connecting to send NOTIFY messages.
    pub host: String,
    /// The NOTIFY port.
    pub port: u16,
    /// Every address `host` resolved to. Transfer connections are admitted from these.
    pub addrs: Vec<IpAddr>,
}

/// An immutable list of slaves together with an address index.
#[derive(Debug, Default)]
pub struct SlaveRegistry {
    slaves: Vec<Arc<Slave>>,
    by_addr: HashMap<IpAddr, Arc<Slave>>,
}

impl SlaveRegistry {
    /// Build a registry. When two slaves share an address, the later one owns it in the index.
    #[must_use]
    pub fn new(slaves: Vec<Slave>) -> Self {
        let slaves: Vec<Arc<Slave>> = slaves.into_iter().map(Arc::new).collect();
        let mut by_addr = HashMap::new();
        for slave in &slaves {
            for addr in &slave.addrs {
                by_addr.insert(normalize(*addr), slave.clone());
            }
        }
        Self { slaves, by_addr }
    }

    /// Return the slave owning `addr`, if any. IPv4-mapped IPv6 addresses match their IPv4 form.
    #[must_use]
    pub fn lookup(&self, addr: IpAddr) -> Option<&Arc<Slave>> {
        self.by_addr.get(&normalize(addr))
    }

    #[must_use]
    pub fn slaves(&self) -> &[Arc<Slave>] {
        &self.slaves
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slaves.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slaves.is_empty()
    }
}

/// Strip the `::ffff:` prefix from IPv4-mapped IPv6 addresses.
#[must_use]
pub fn normalize(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(addr, IpAddr::V4),
        IpAddr::V4(_) => addr,
    }
}

/// Hostname resolution used for slave descriptors.
#[async_trait::async_trait]
pub trait Resolve {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// `DynResolver` is a shareable [`Resolve`] implementation.
pub type DynResolver = Arc<dyn Resolve + Send + Sync>;

/// Resolves through the operating system, via [`tokio::net::lookup_host`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait::async_trait]
impl Resolve for SystemResolver {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Resolve every descriptor concurrently, keeping their order.
///
/// # Errors
///
/// Returns [`Error::Resolution`] for the first host that fails to resolve, or resolves to no
/// addresses at all.
pub async fn resolve_all(
    resolver: &(dyn Resolve + Send + Sync),
    descriptors: &[SlaveDescriptor],
) -> Result<Vec<Slave>, Error> {
    try_join_all(descriptors.iter().map(|d| async move {
        let addrs = resolver
            .resolve(&d.host)
            .await
            .map_err(|source| Error::Resolution {
                host: d.host.clone(),
                source,
            })?;
        if addrs.is_empty() {
            return Err(Error::Resolution {
                host: d.host.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses"),
            });
        }
        tracing::debug!("resolved slave {d} to {addrs:?}");
        Ok(Slave {
            host: d.host.clone(),
            port: d.port,
            addrs,
        })
    }))
    .await
}
