//! XFR Crab
//!
//! A small DNS zone transfer responder: serves [AXFR][RFC-5936] and [IXFR][RFC-1995] for a single
//! zone to a whitelist of secondary servers, and pushes [NOTIFY][RFC-1996] messages to them when
//! the zone changes.
//!
//! The zone's records come from a [`ZoneProvider`][dns::ZoneProvider] supplied by the embedding
//! program. The `xfrcrab` binary serves a [`StaticZone`][dns::StaticZone] described in its JSON
//! [configuration][config::Config], together with a small [admin API][api].
//!
//! [RFC-5936]: https://www.rfc-editor.org/rfc/rfc5936
//! [RFC-1995]: https://www.rfc-editor.org/rfc/rfc1995
//! [RFC-1996]: https://www.rfc-editor.org/rfc/rfc1996
//!
#![warn(clippy::pedantic)]

pub mod api;
pub mod config;
pub mod dns;
pub mod error;
pub mod slaves;

pub use api::new as new_http;
pub use config::{Config, SharedConfig};
pub use dns::new as new_dns;
pub use dns::{StaticZone, ZoneProvider, ZoneServer};
pub use slaves::{SlaveDescriptor, SlaveRegistry};
