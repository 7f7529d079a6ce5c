use crate::config::SharedConfig;
use crate::dns::batcher::DEFAULT_BATCH_SIZE;
use crate::dns::codec::{self, DEFAULT_PACKET_SIZE};
use crate::dns::notify;
use crate::dns::provider::{Context, DynZoneProvider};
use crate::dns::session::Session;
use crate::error::Error;
use crate::slaves::{self, DynResolver, Slave, SlaveDescriptor, SlaveRegistry, SystemResolver};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::Instrument;
use trust_dns_proto::rr::Name;

/// Transfer tuning that can be changed while the server runs.
///
/// A connection picks up new settings at its next request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Records per AXFR/IXFR response message.
    pub batch_size: usize,
    /// Largest encoded response, in bytes.
    pub packet_size: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            packet_size: DEFAULT_PACKET_SIZE,
        }
    }
}

/// A zone transfer server for a single zone.
///
/// Cheap to clone; clones share the slave registry and settings.
#[derive(Clone)]
#[allow(clippy::module_name_repetitions)]
pub struct ZoneServer {
    zone: Name,
    provider: DynZoneProvider,
    resolver: DynResolver,
    slaves: Arc<ArcSwap<SlaveRegistry>>,
    settings: Arc<ArcSwap<TransferSettings>>,
}

impl ZoneServer {
    /// Serve `zone` from `provider`. No slaves are registered, so no connection is admitted
    /// until [`ZoneServer::set_slaves`] succeeds.
    #[must_use]
    pub fn new(zone: Name, provider: DynZoneProvider) -> Self {
        let mut zone = zone;
        zone.set_fqdn(true);
        Self {
            zone,
            provider,
            resolver: Arc::new(SystemResolver),
            slaves: Arc::new(ArcSwap::from_pointee(SlaveRegistry::default())),
            settings: Arc::new(ArcSwap::from_pointee(TransferSettings::default())),
        }
    }

    /// Use `resolver` instead of the system resolver for slave hosts.
    #[must_use]
    pub fn with_resolver(mut self, resolver: DynResolver) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn zone(&self) -> &Name {
        &self.zone
    }

    /// Resolve `descriptors` and replace the slave registry with the result.
    ///
    /// When several calls overlap, the last one to finish resolving wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolution`] if any host fails to resolve, leaving the registry as it
    /// was.
    pub async fn set_slaves(&self, descriptors: &[SlaveDescriptor]) -> Result<(), Error> {
        let resolved = slaves::resolve_all(self.resolver.as_ref(), descriptors).await?;
        let registry = SlaveRegistry::new(resolved);
        tracing::info!("registered {} slave(s)", registry.len());
        self.slaves.store(Arc::new(registry));
        Ok(())
    }

    /// The current slave registry.
    #[must_use]
    pub fn slaves(&self) -> Arc<SlaveRegistry> {
        self.slaves.load_full()
    }

    /// The slave `addr` belongs to, if it is allowed to transfer the zone.
    #[must_use]
    pub fn is_whitelisted(&self, addr: IpAddr) -> Option<Arc<Slave>> {
        self.slaves.load().lookup(addr).cloned()
    }

    #[must_use]
    pub fn settings(&self) -> TransferSettings {
        **self.settings.load()
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidSetting`] for a zero batch size.
    pub fn set_batch_size(&self, batch_size: usize) -> Result<(), Error> {
        if batch_size == 0 {
            return Err(Error::InvalidSetting {
                name: "batch_size",
                value: batch_size,
            });
        }
        self.settings.rcu(|settings| TransferSettings {
            batch_size,
            ..**settings
        });
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidSetting`] for a packet size that can't hold a DNS header, or that
    /// doesn't fit the 2-byte TCP length prefix.
    pub fn set_packet_size(&self, packet_size: usize) -> Result<(), Error> {
        if !(MIN_PACKET_SIZE..=usize::from(u16::MAX)).contains(&packet_size) {
            return Err(Error::InvalidSetting {
                name: "packet_size",
                value: packet_size,
            });
        }
        self.settings.rcu(|settings| TransferSettings {
            packet_size,
            ..**settings
        });
        Ok(())
    }

    /// Send a NOTIFY for the zone to every registered slave, without waiting for replies.
    ///
    /// Returns the delivery tasks, one per slave. Failed deliveries are only logged.
    pub fn notify(&self) -> Vec<JoinHandle<()>> {
        notify::send_all(&self.zone, &self.slaves())
    }

    /// Accept connections on `listener` forever.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if accepting fails; failures of individual connections are logged
    /// and don't stop the server.
    pub async fn serve(self, listener: TcpListener) -> Result<(), Error> {
        loop {
            let (stream, peer) = listener.accept().await?;
            self.accept(stream, peer);
        }
    }

    fn accept(&self, stream: TcpStream, peer: SocketAddr) {
        let Some(slave) = self.is_whitelisted(peer.ip()) else {
            tracing::debug!("rejected connection from {peer}: not a registered slave");
            return;
        };

        let settings = self.settings();
        let (reader, writer) = codec::framed(stream, settings.packet_size);
        let ctx = Context {
            peer,
            slave: Some(slave),
        };
        let session = Session::new(
            ctx,
            self.zone.clone(),
            self.provider.clone(),
            self.settings.clone(),
            reader,
            writer,
        );
        tokio::spawn(
            async move {
                match session.run().await {
                    Ok(()) => tracing::debug!("connection closed"),
                    Err(err) => tracing::warn!("connection failed: {err}"),
                }
            }
            .instrument(tracing::info_span!("xfr", %peer)),
        );
    }
}

/// A DNS header is 12 bytes; anything smaller can't hold a response.
const MIN_PACKET_SIZE: usize = 12;

/// Build a [`ZoneServer`] from `config`, register its slaves and bind its TCP listener.
///
/// # Errors
///
/// Returns an error if the zone name is invalid, a slave fails to resolve, or the listener can't
/// be bound.
pub async fn new(
    config: SharedConfig,
    provider: DynZoneProvider,
) -> Result<(ZoneServer, TcpListener), Error> {
    let server = ZoneServer::new(config.zone()?, provider);
    server.set_batch_size(config.batch_size)?;
    server.set_packet_size(config.packet_size)?;
    server.set_slaves(&config.slaves).await?;
    let listener = TcpListener::bind(config.dns_tcp_bind_addr).await?;
    Ok((server, listener))
}
