//! Slave descriptors, as written in configuration files and admin API requests.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The port NOTIFY messages are sent to when a descriptor doesn't name one.
pub const DEFAULT_NOTIFY_PORT: u16 = 53;

/// A secondary server, before resolution.
///
/// Deserializes from either a string (`"ns2.example.com"` or `"ns2.example.com@5353"`) or an
/// object (`{"host": "ns2.example.com", "port": 5353}`, `port` being optional).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDescriptor", into = "String")]
pub struct SlaveDescriptor {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDescriptor {
    Text(String),
    Explicit {
        host: String,
        #[serde(default = "default_port")]
        port: u16,
    },
}

fn default_port() -> u16 {
    DEFAULT_NOTIFY_PORT
}

impl SlaveDescriptor {
    /// # Errors
    ///
    /// Returns [`Error::InvalidSlave`] for an empty host.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, Error> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(Error::InvalidSlave(host));
        }
        Ok(Self { host, port })
    }
}

impl FromStr for SlaveDescriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('@') {
            None => Self::new(s, DEFAULT_NOTIFY_PORT),
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| Error::InvalidSlave(s.to_string()))?;
                Self::new(host, port).map_err(|_| Error::InvalidSlave(s.to_string()))
            }
        }
    }
}

impl TryFrom<RawDescriptor> for SlaveDescriptor {
    type Error = Error;

    fn try_from(raw: RawDescriptor) -> Result<Self, Self::Error> {
        match raw {
            RawDescriptor::Text(s) => s.parse(),
            RawDescriptor::Explicit { host, port } => Self::new(host, port),
        }
    }
}

impl fmt::Display for SlaveDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.host, self.port)
    }
}

impl From<SlaveDescriptor> for String {
    fn from(descriptor: SlaveDescriptor) -> Self {
        descriptor.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_defaults_port() {
        let d: SlaveDescriptor = "ns2.example.com".parse().unwrap();
        assert_eq!(d.host, "ns2.example.com");
        assert_eq!(d.port, 53);
    }

    #[test]
    fn host_at_port() {
        let d: SlaveDescriptor = "ns2.example.com@1234".parse().unwrap();
        assert_eq!(d.host, "ns2.example.com");
        assert_eq!(d.port, 1234);
    }

    #[test]
    fn rejects_bad_port_and_empty_host() {
        assert!(matches!(
            "ns2@dns".parse::<SlaveDescriptor>(),
            Err(Error::InvalidSlave(_))
        ));
        assert!(matches!(
            "ns2@70000".parse::<SlaveDescriptor>(),
            Err(Error::InvalidSlave(_))
        ));
        assert!(matches!(
            "@53".parse::<SlaveDescriptor>(),
            Err(Error::InvalidSlave(_))
        ));
    }

    #[test]
    fn deserializes_every_form() {
        let list: Vec<SlaveDescriptor> = serde_json::from_str(
            r#"["a.example", "b.example@5300", {"host": "c.example", "port": 5301}, {"host": "d.example"}]"#,
        )
        .unwrap();
        assert_eq!(
            list,
            vec![
                SlaveDescriptor::new("a.example", 53).unwrap(),
                SlaveDescriptor::new("b.example", 5300).unwrap(),
                SlaveDescriptor::new("c.example", 5301).unwrap(),
                SlaveDescriptor::new("d.example", 53).unwrap(),
            ]
        );
        assert!(serde_json::from_str::<SlaveDescriptor>(r#""x@y""#).is_err());
    }

    #[test]
    fn serializes_as_host_at_port() {
        let d = SlaveDescriptor::new("a.example", 5300).unwrap();
        assert_eq!(serde_json::to_string(&d).unwrap(), r#""a.example@5300""#);
    }
}
