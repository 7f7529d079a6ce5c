//! Zone transfer server.
//!
//! XFR Crab answers `SOA`, `AXFR` and `IXFR` queries over TCP for exactly one zone, and only to
//! the secondaries registered as [slaves][crate::slaves]. Connections from any other address are
//! closed without a response.
//!
//! # Transfers
//!
//! The zone's records come from a [`ZoneProvider`]. An AXFR is answered with a stream of
//! messages, all carrying the request's id:
//!
//! 1. the SOA record,
//! 2. the body records, [`TransferSettings::batch_size`] per message, in the order the provider
//!    emitted them,
//! 3. the SOA record again.
//!
//! E.g. with a batch size of 2 and a zone of three `A` records:
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5353 test.lan AXFR
//! test.lan.       3600 IN SOA ns1.test.lan. hostmaster.test.lan. 20230312 86400 7200 3600000 172800
//! a.test.lan.     3600 IN A   192.0.2.1
//! b.test.lan.     3600 IN A   192.0.2.2
//! c.test.lan.     3600 IN A   192.0.2.3
//! test.lan.       3600 IN SOA ns1.test.lan. hostmaster.test.lan. 20230312 86400 7200 3600000 172800
//! ;; XFR size: 5 records (messages 4, bytes 301)
//! ```
//!
//! IXFR is served the same way; the provider receives the serial from the request's authority
//! section and decides what to emit.
//!
//! # Errors
//!
//! | Request | Response code |
//! | --- | --- |
//! | zero or several questions | `FORMERR` |
//! | not a `QUERY`, not class `IN`, not the zone, or not `SOA`/`AXFR`/`IXFR` | `NOTIMP` |
//! | provider failure | `SERVFAIL` |
//!
//! A `SERVFAIL` during a transfer replaces the closing SOA, so secondaries discard the partial
//! transfer.
//!
//! # NOTIFY
//!
//! [`ZoneServer::notify`] tells every slave the zone changed, see [`notify`].

pub(crate) mod batcher;
pub mod codec;
pub mod notify;
pub mod provider;
pub mod server;
mod session;
pub mod zone;

pub use provider::{Context, DynZoneProvider, Emitter, ZoneProvider};
pub use server::{new, TransferSettings, ZoneServer};
pub use zone::StaticZone;
