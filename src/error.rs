//! Error types.

use axum::extract::rejection::JsonRejection;
use std::net::IpAddr;
use trust_dns_proto::error::ProtoError;

/// Error enumerates the possible XFR Crab error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned when a slave descriptor can't be understood, e.g. `"@53"` or `"ns1@notaport"`.
    #[error("invalid slave descriptor \"{0}\"")]
    InvalidSlave(String),

    /// Returned by [`ZoneServer::set_slaves`][crate::dns::server::ZoneServer::set_slaves] when
    /// any one slave host fails to resolve. The slave registry is left unchanged.
    #[error("could not resolve slave host \"{host}\"")]
    Resolution {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// Returned when an inbound frame doesn't hold a valid DNS message. Ends the connection.
    #[error("malformed DNS message")]
    Decode(#[source] ProtoError),

    /// Returned when an outbound message can't be encoded within the configured
    /// [packet size][crate::dns::server::TransferSettings::packet_size].
    #[error("could not encode DNS message")]
    Encode(#[source] ProtoError),

    /// Returned when an encoded message doesn't fit the 2-byte TCP length prefix.
    #[error("DNS message of {0} bytes is too large for TCP framing")]
    MessageTooLarge(usize),

    /// Returned when a [`ZoneProvider::log_request`][crate::dns::provider::ZoneProvider::log_request]
    /// hook fails. This ends the connection.
    #[error("request log hook failed: {0:#}")]
    LogHook(anyhow::Error),

    /// Returned when a transfer setting is out of range, e.g. a zero batch size.
    #[error("invalid setting {name}: {value}")]
    InvalidSetting { name: &'static str, value: usize },

    /// Returned when clients `PUT` invalid JSON to the [admin API][crate::api].
    #[error(transparent)]
    JsonExtractorRejection(#[from] JsonRejection),

    /// Returned when the [`Config::api_bind_addr`][`crate::config::Config::api_bind_addr`] is
    /// not a loopback address, or an address within a private network space. The
    /// [admin API][crate::api] can replace the slave whitelist and must never be exposed
    /// publicly.
    #[error("API bind address ({0}) must be a loopback or private IP")]
    InsecureAPIBind(IpAddr),

    /// Returned when a generic IO error occurs.
    #[error("an IO error occurred")]
    IO(#[from] std::io::Error),

    /// Returned when [trying to load a `Config`][crate::config::Config::try_from_file] fails
    /// due to invalid JSON content.
    #[error("invalid JSON")]
    InvalidJSON(#[from] serde_json::Error),

    /// Returned when XFR Crab encounters a generic DNS protocol error, e.g. an unparsable
    /// zone name.
    #[error("DNS error")]
    DNSError(#[from] ProtoError),
}
