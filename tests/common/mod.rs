#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use trust_dns_proto::op::{Message, MessageType, OpCode, Query};
use trust_dns_proto::rr::rdata::SOA;
use trust_dns_proto::rr::{Name, RData, Record, RecordType};
use xfrcrab::dns::codec::{self, MessageReader, MessageWriter, DEFAULT_PACKET_SIZE};
use xfrcrab::dns::{Context, Emitter, ZoneProvider, ZoneServer};
use xfrcrab::slaves::Resolve;
use xfrcrab::SlaveDescriptor;

pub const SERIAL: u32 = 2_023_031_201;

pub fn zone_name() -> Name {
    Name::from_str("test.lan.").unwrap()
}

pub fn soa_record() -> Record {
    Record::from_rdata(
        zone_name(),
        3600,
        RData::SOA(SOA::new(
            Name::from_str("ns1.test.lan.").unwrap(),
            Name::from_str("hostmaster.test.lan.").unwrap(),
            SERIAL,
            86_400,
            7_200,
            3_600_000,
            172_800,
        )),
    )
}

pub fn a_record(index: u8) -> Record {
    Record::from_rdata(
        Name::from_str(&format!("host{index}.test.lan.")).unwrap(),
        3600,
        RData::A(Ipv4Addr::new(192, 0, 2, index)),
    )
}

/// A zone of `records` A records that optionally fails after emitting `fail_after` of them.
#[derive(Default)]
pub struct TestZone {
    pub records: u8,
    pub fail_after: Option<u8>,
    pub failures: Mutex<Vec<String>>,
    pub contexts: Mutex<Vec<Context>>,
}

#[async_trait::async_trait]
impl ZoneProvider for TestZone {
    fn log_request(&self, ctx: &Context, _request: &Message) -> anyhow::Result<()> {
        self.contexts.lock().unwrap().push(ctx.clone());
        Ok(())
    }

    async fn soa(&self, _ctx: &Context, _request: &Message) -> anyhow::Result<Record> {
        Ok(soa_record())
    }

    async fn body(
        &self,
        _ctx: &Context,
        _request: &Message,
        _query: &Query,
        _soa: &Record,
        _serial: Option<u32>,
        emitter: Emitter,
    ) -> anyhow::Result<()> {
        for index in 1..=self.records {
            if Some(index - 1) == self.fail_after {
                anyhow::bail!("backend failed at record {index}");
            }
            emitter.emit(a_record(index)).await;
        }
        if self.fail_after == Some(self.records) {
            anyhow::bail!("backend failed after {} records", self.records);
        }
        Ok(())
    }

    fn transfer_failed(
        &self,
        _ctx: &Context,
        _request: &Message,
        _query: &Query,
        error: &anyhow::Error,
    ) {
        self.failures.lock().unwrap().push(error.to_string());
    }
}

/// Resolves hosts from a fixed table, and IP literals to themselves.
#[derive(Default)]
pub struct TableResolver(pub HashMap<String, Vec<IpAddr>>);

#[async_trait::async_trait]
impl Resolve for TableResolver {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }
        self.0
            .get(host)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no such host {host}")))
    }
}

pub fn resolver(entries: &[(&str, &str)]) -> Arc<TableResolver> {
    let mut table: HashMap<String, Vec<IpAddr>> = HashMap::new();
    for (host, addr) in entries {
        table
            .entry((*host).to_string())
            .or_default()
            .push(addr.parse().unwrap());
    }
    Arc::new(TableResolver(table))
}

/// Start a server for `test.lan` whose only slave, `slave.test`, resolves to `slave_addr`.
pub async fn start_server(
    zone: Arc<TestZone>,
    slave_addr: &str,
    batch_size: usize,
) -> (ZoneServer, SocketAddr) {
    let server = ZoneServer::new(zone_name(), zone)
        .with_resolver(resolver(&[("slave.test", slave_addr)]));
    server.set_batch_size(batch_size).unwrap();
    server
        .set_slaves(&["slave.test@1234".parse::<SlaveDescriptor>().unwrap()])
        .await
        .unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.clone().serve(listener));
    (server, addr)
}

pub struct Client {
    pub reader: MessageReader<OwnedReadHalf>,
    pub writer: MessageWriter<OwnedWriteHalf>,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = codec::framed(stream, DEFAULT_PACKET_SIZE);
        Self { reader, writer }
    }

    pub async fn send(&mut self, message: &Message) {
        self.writer.write_message(message).await.unwrap();
    }

    /// The next response, failing the test if none arrives in time.
    pub async fn recv(&mut self) -> Option<Message> {
        tokio::time::timeout(Duration::from_secs(5), self.reader.read_message())
            .await
            .expect("timed out waiting for a response")
            .ok()
            .flatten()
    }

    /// Read responses until one answers with the SOA again or fails.
    pub async fn recv_transfer(&mut self) -> Vec<Message> {
        let mut messages = vec![self.recv().await.expect("no first response")];
        loop {
            let message = self.recv().await.expect("transfer cut short");
            let done = message.response_code() != trust_dns_proto::op::ResponseCode::NoError
                || message.answers().first().map(Record::rr_type) == Some(RecordType::SOA);
            messages.push(message);
            if done {
                return messages;
            }
        }
    }
}

pub fn query(id: u16, name: &str, record_type: RecordType) -> Message {
    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .add_query(Query::query(Name::from_ascii(name).unwrap(), record_type));
    message
}
