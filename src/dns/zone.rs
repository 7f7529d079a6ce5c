//! A [`ZoneProvider`] serving the records listed in the [`Config`][crate::config::Config].

use crate::config::SharedConfig;
use crate::dns::provider::{Context, Emitter, ZoneProvider};
use crate::error::Error;
use lazy_static::lazy_static;
use std::net::IpAddr;
use time::macros::format_description;
use time::OffsetDateTime;
use trust_dns_proto::op::{Message, Query};
use trust_dns_proto::rr::rdata::SOA;
use trust_dns_proto::rr::{Name, RData, Record};

lazy_static! {
    static ref SERIAL_FORMATTER: &'static [time::format_description::FormatItem<'static>] =
        format_description!(version = 2, "[year][month][day]");
}

/// Serves a fixed set of NS, A and AAAA records, with an SOA whose serial is today's date.
#[derive(Debug, Clone)]
pub struct StaticZone {
    zone: Name,
    ns_domain: Name,
    ns_admin: Name,
    ttl: u32,
    records: Vec<Record>,
}

impl StaticZone {
    /// Build the zone's records from `config`.
    ///
    /// Record names that aren't fully qualified are taken relative to the zone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DNSError`] if any configured name is invalid.
    pub fn new(config: &SharedConfig) -> Result<Self, Error> {
        let zone = config.zone()?;
        let ttl = config.ttl;
        let mut records = vec![];

        for (owner, targets) in &config.ns_records {
            let owner = qualify(owner, &zone)?;
            for target in targets {
                let target = qualify(target, &zone)?;
                records.push(Record::from_rdata(owner.clone(), ttl, RData::NS(target)));
            }
        }

        for (owner, addrs) in &config.addrs {
            let owner = qualify(owner, &zone)?;
            records.extend(addrs.iter().map(|ip| {
                let rdata = match ip {
                    IpAddr::V4(ipv4_addr) => RData::A(*ipv4_addr),
                    IpAddr::V6(ipv6_addr) => RData::AAAA(*ipv6_addr),
                };
                Record::from_rdata(owner.clone(), ttl, rdata)
            }));
        }

        Ok(Self {
            ns_domain: qualify(&config.ns_domain, &zone)?,
            ns_admin: config.ns_admin()?,
            zone,
            ttl,
            records,
        })
    }

    /// The zone's serial: the current UTC date as `YYYYMMDD`.
    #[must_use]
    pub fn serial() -> u32 {
        // NB: unwraps are safe: known date format producing values that will always parse as u32.
        OffsetDateTime::now_utc()
            .format(&SERIAL_FORMATTER)
            .unwrap()
            .parse()
            .unwrap()
    }

    #[must_use]
    pub fn soa_record(&self) -> Record {
        // See RIPE 203[0] for recommended values.
        // [0]: https://www.ripe.net/publications/docs/ripe-203
        let soa_rdata = RData::SOA(SOA::new(
            self.ns_domain.clone(),
            self.ns_admin.clone(),
            Self::serial(),
            86_400,    // 24 hrs.
            7_200,     // 2 hours.
            3_600_000, // 1000 hours.
            172_800,   // 2 days.
        ));
        Record::from_rdata(self.zone.clone(), self.ttl, soa_rdata)
    }

    /// Every record except the SOA, in transfer order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

fn qualify(name: &str, zone: &Name) -> Result<Name, Error> {
    let name = Name::from_ascii(name)?;
    if name.is_fqdn() {
        return Ok(name);
    }
    Ok(name.append_domain(zone)?)
}

fn soa_serial(record: &Record) -> Option<u32> {
    match record.data() {
        Some(RData::SOA(soa)) => Some(soa.serial()),
        _ => None,
    }
}

#[async_trait::async_trait]
impl ZoneProvider for StaticZone {
    fn log_request(&self, ctx: &Context, request: &Message) -> anyhow::Result<()> {
        let slave = ctx.slave.as_ref().map_or("-", |slave| slave.host.as_str());
        for query in request.queries() {
            tracing::info!(
                "request {} from {} ({slave}): {} {} {}",
                request.id(),
                ctx.peer,
                query.name(),
                query.query_class(),
                query.query_type()
            );
        }
        Ok(())
    }

    async fn soa(&self, _ctx: &Context, _request: &Message) -> anyhow::Result<Record> {
        Ok(self.soa_record())
    }

    async fn body(
        &self,
        _ctx: &Context,
        _request: &Message,
        _query: &Query,
        soa: &Record,
        serial: Option<u32>,
        emitter: Emitter,
    ) -> anyhow::Result<()> {
        if serial.is_some() && serial == soa_serial(soa) {
            tracing::debug!("IXFR client is current at serial {serial:?}");
            return Ok(());
        }
        for record in &self.records {
            if !emitter.emit(record.clone()).await {
                break;
            }
        }
        Ok(())
    }

    fn transfer_failed(
        &self,
        ctx: &Context,
        request: &Message,
        query: &Query,
        error: &anyhow::Error,
    ) {
        tracing::error!(
            "transfer {} of {} for {} failed: {error:#}",
            request.id(),
            query.name(),
            ctx.peer
        );
    }
}
