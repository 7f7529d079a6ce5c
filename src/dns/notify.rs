//! NOTIFY ([RFC-1996][RFC-1996]) delivery to slaves.
//!
//! Deliveries are fire-and-forget: a NOTIFY is written to each slave over a fresh TCP connection
//! which is then closed. Replies aren't read and failures aren't retried.
//!
//! [RFC-1996]: https://www.rfc-editor.org/rfc/rfc1996

use crate::dns::codec::{self, DEFAULT_PACKET_SIZE};
use crate::error::Error;
use crate::slaves::{Slave, SlaveRegistry};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use trust_dns_proto::op::{Message, MessageType, OpCode, Query};
use trust_dns_proto::rr::{DNSClass, Name, RecordType};

/// Build the NOTIFY message announcing a change to `zone`.
#[must_use]
pub fn notify_message(zone: &Name, id: u16) -> Message {
    let mut query = Query::query(zone.clone(), RecordType::SOA);
    query.set_query_class(DNSClass::IN);
    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Notify)
        .set_authoritative(true)
        .add_query(query);
    message
}

/// Spawn one delivery task per slave in `registry`, all carrying the same NOTIFY.
pub(crate) fn send_all(zone: &Name, registry: &SlaveRegistry) -> Vec<JoinHandle<()>> {
    if registry.is_empty() {
        tracing::debug!("no slaves to notify for {zone}");
        return vec![];
    }

    let frame = match codec::encode_frame(&notify_message(zone, rand::random()), DEFAULT_PACKET_SIZE)
    {
        Ok(frame) => Arc::new(frame),
        Err(err) => {
            tracing::error!("could not encode NOTIFY for {zone}: {err}");
            return vec![];
        }
    };

    registry
        .slaves()
        .iter()
        .map(|slave| {
            let slave = slave.clone();
            let frame = frame.clone();
            tokio::spawn(async move {
                match deliver(&slave, &frame).await {
                    Ok(()) => tracing::debug!("sent NOTIFY to {}:{}", slave.host, slave.port),
                    Err(err) => tracing::warn!(
                        "NOTIFY to {}:{} failed: {err}",
                        slave.host,
                        slave.port
                    ),
                }
            })
        })
        .collect()
}

async fn deliver(slave: &Slave, frame: &[u8]) -> Result<(), Error> {
    let stream = TcpStream::connect((slave.host.as_str(), slave.port)).await?;
    let (_, mut writer) = codec::framed(stream, DEFAULT_PACKET_SIZE);
    writer.write_frame(frame).await?;
    writer.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn notify_message_shape() {
        let zone = Name::from_str("test.lan.").unwrap();
        let message = notify_message(&zone, 4242);
        assert_eq!(message.id(), 4242);
        assert_eq!(message.op_code(), OpCode::Notify);
        assert!(message.authoritative());
        assert_eq!(message.queries().len(), 1);
        let query = &message.queries()[0];
        assert_eq!(query.query_class(), DNSClass::IN);
        assert_eq!(query.query_type(), RecordType::SOA);
        assert_eq!(query.name(), &zone);
    }

    #[tokio::test]
    async fn empty_registry_sends_nothing() {
        let zone = Name::from_str("test.lan.").unwrap();
        assert!(send_all(&zone, &SlaveRegistry::default()).is_empty());
    }
}
