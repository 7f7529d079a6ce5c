//! HTTP API for administering a running zone transfer server.
//!
//! The API can replace the slave whitelist, so it only binds loopback or private addresses (see
//! [`Config::api_bind_addr`][crate::config::Config::api_bind_addr]) and is meant to be reached
//! over a trusted network.
//!
//! # API Endpoints
//!
//! ## `/healthcheck` (GET)
//!
//!   Returns HTTP 200 (OK) and the JSON body `{"ok":"healthy"}` when the service is operational.
//!
//! ## `/notify` (POST)
//!
//!   Sends a NOTIFY for the zone to every registered slave. Delivery happens in the background;
//!   the response only reports how many slaves are being notified:
//!
//!   ```json
//!   { "notified": 2 }
//!   ```
//!
//! ## `/slaves` (GET)
//!
//!   Returns the registered slaves and the addresses they resolved to:
//!
//!   ```json
//!   { "slaves": [ { "host": "ns2.example.com", "port": 53, "addrs": [ "192.0.2.53" ] } ] }
//!   ```
//!
//! ## `/slaves` (PUT)
//!
//!   Expects a JSON request body of the form:
//!
//!   ```json
//!   { "slaves": [ "ns2.example.com", "ns3.example.com@5353", { "host": "192.0.2.54", "port": 53 } ] }
//!   ```
//!
//!   All hosts are resolved before anything changes. If any of them fails to resolve, HTTP 502
//!   (Bad Gateway) is returned and the previous slaves stay registered. On success the
//!   response has the same form as `GET /slaves`.
//!
//! ## `/settings` (GET, PUT)
//!
//!   Reads or updates the transfer settings. `PUT` accepts any subset of the fields:
//!
//!   ```json
//!   { "batch_size": 20, "packet_size": 4096 }
//!   ```
//!
//!   Connections pick up new settings at their next request.

mod api_error;
mod model;
mod routes;
pub mod server;

pub use server::new;
