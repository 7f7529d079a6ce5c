//! The zone data interface a [`ZoneServer`][super::server::ZoneServer] serves transfers from.

use crate::slaves::Slave;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use trust_dns_proto::op::{Message, Query};
use trust_dns_proto::rr::Record;

/// `DynZoneProvider` is a type alias for a [`ZoneProvider`] shared by every connection.
#[allow(clippy::module_name_repetitions)]
pub type DynZoneProvider = Arc<dyn ZoneProvider + Send + Sync>;

/// Per-connection information handed to every [`ZoneProvider`] call.
#[derive(Debug, Clone)]
pub struct Context {
    /// Address of the requesting secondary.
    pub peer: SocketAddr,
    /// The registered slave `peer` was admitted as.
    pub slave: Option<Arc<Slave>>,
}

/// Supplies the records of the zone being transferred.
///
/// Providers are called from connection tasks; at most one call is outstanding per connection,
/// but calls for different connections run concurrently.
#[async_trait::async_trait]
#[allow(clippy::module_name_repetitions)]
pub trait ZoneProvider {
    /// Called once for every request with exactly one question, before it is validated.
    ///
    /// Returning an error closes the connection.
    fn log_request(&self, _ctx: &Context, _request: &Message) -> anyhow::Result<()> {
        Ok(())
    }

    /// Produce the zone's current SOA record.
    ///
    /// It is sent as the sole answer of a SOA query, and opens and closes every AXFR/IXFR
    /// response stream. Failing answers the request with `SERVFAIL`.
    async fn soa(&self, ctx: &Context, request: &Message) -> anyhow::Result<Record>;

    /// Stream the zone's body records through `emitter`, in the order they should be sent.
    ///
    /// `serial` is the secondary's current serial for IXFR requests that carry one, `None` for
    /// AXFR. Returning an error after emitting records answers with `SERVFAIL` instead of the
    /// closing SOA; records emitted after this call returns are ignored.
    async fn body(
        &self,
        ctx: &Context,
        request: &Message,
        query: &Query,
        soa: &Record,
        serial: Option<u32>,
        emitter: Emitter,
    ) -> anyhow::Result<()>;

    /// Called after [`ZoneProvider::soa`] or [`ZoneProvider::body`] failed and `SERVFAIL` was
    /// sent.
    fn transfer_failed(
        &self,
        _ctx: &Context,
        _request: &Message,
        _query: &Query,
        _error: &anyhow::Error,
    ) {
    }
}

/// Hands body records from a [`ZoneProvider`] to the connection sending them.
///
/// Cheap to clone. Emitting waits while the connection is behind on writing earlier batches.
#[derive(Debug, Clone)]
pub struct Emitter {
    tx: mpsc::Sender<Record>,
}

impl Emitter {
    pub(crate) fn new(tx: mpsc::Sender<Record>) -> Self {
        Self { tx }
    }

    /// Queue `record` for sending. Returns `false`, dropping the record, once the transfer it
    /// belonged to is over.
    pub async fn emit(&self, record: Record) -> bool {
        self.tx.send(record).await.is_ok()
    }

    /// Whether the transfer this emitter feeds is over.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
