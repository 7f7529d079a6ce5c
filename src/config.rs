use crate::dns::batcher::DEFAULT_BATCH_SIZE;
use crate::dns::codec::DEFAULT_PACKET_SIZE;
use crate::error::Error;
use crate::slaves::SlaveDescriptor;
use ipnetwork::IpNetwork;
use lazy_static::lazy_static;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use trust_dns_proto::rr::Name;

pub type SharedConfig = Arc<Config>;

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// The zone served. Matched case-sensitively against transfer questions.
    pub domain: String,
    /// Secondaries allowed to transfer the zone, and sent NOTIFY messages.
    #[serde(default)]
    pub slaves: Vec<SlaveDescriptor>,
    #[serde(default = "default_packet_size", alias = "packetSize")]
    pub packet_size: usize,
    #[serde(default = "default_batch_size", alias = "batchSize")]
    pub batch_size: usize,
    pub dns_tcp_bind_addr: SocketAddr,
    pub api_bind_addr: SocketAddr,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub api_timeout: Duration,
    pub ns_domain: String,
    pub ns_admin: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(default)]
    pub addrs: BTreeMap<String, Vec<IpAddr>>,
    #[serde(default)]
    pub ns_records: BTreeMap<String, Vec<String>>,
}

fn default_packet_size() -> usize {
    DEFAULT_PACKET_SIZE
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_ttl() -> u32 {
    3600
}

lazy_static! {
    // NOTE(XXX): Once the "ip" feature has stabilized we can use Ipv6Addr.is_unique_local[0].
    //            Presently this feature is unstable so we home-roll. See also RFC 4193[1].
    // [0]: https://doc.rust-lang.org/std/net/struct.Ipv6Addr.html#method.is_unique_local
    // [1]: https://www.rfc-editor.org/rfc/rfc4193.html
    static ref IPV6_UNIQUE_LOCAL_NETWORK: IpNetwork = IpNetwork::from_str("fc00::/7").unwrap();
}

impl Config {
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let f = File::open(p)?;
        let reader = BufReader::new(f);
        let conf: Config = serde_json::from_reader(reader)?;
        conf.validate()?;
        Ok(conf)
    }

    /// The zone as a fully qualified name, keeping the configured case.
    pub fn zone(&self) -> Result<Name, Error> {
        let mut zone = Name::from_ascii(&self.domain)?;
        zone.set_fqdn(true);
        Ok(zone)
    }

    pub fn ns_admin(&self) -> Result<Name, Error> {
        Ok(Name::from_str(&self.sanitized_ns_admin())?)
    }

    fn sanitized_ns_admin(&self) -> Cow<str> {
        match self.ns_admin.split_once('@') {
            Some((user, domain)) => {
                let user = user.replace('.', "\\.");
                Cow::Owned(format!("{user}.{domain}"))
            }
            _ => Cow::Borrowed(&self.ns_admin),
        }
    }

    fn validate(&self) -> Result<(), Error> {
        self.zone()?;
        self.ns_admin()?;
        if self.batch_size == 0 {
            return Err(Error::InvalidSetting {
                name: "batch_size",
                value: self.batch_size,
            });
        }
        self.bind_addr_is_secure()
    }

    fn bind_addr_is_secure(&self) -> Result<(), Error> {
        match self.api_bind_addr {
            SocketAddr::V4(v4_addr) => {
                let ip = v4_addr.ip();
                if !ip.is_loopback() && !ip.is_private() {
                    return Err(Error::InsecureAPIBind(IpAddr::V4(*ip)));
                }
                Ok(())
            }
            SocketAddr::V6(v6_addr) => {
                let ip = v6_addr.ip();
                if !ip.is_loopback() && !IPV6_UNIQUE_LOCAL_NETWORK.contains(IpAddr::V6(*ip)) {
                    return Err(Error::InsecureAPIBind(IpAddr::V6(*ip)));
                }
                Ok(())
            }
        }
    }
}
