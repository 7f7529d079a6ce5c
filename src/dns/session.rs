//! Per-connection zone transfer state machine.
//!
//! A [`Session`] answers the requests arriving on one connection strictly one after the other:
//!
//! 1. Requests without exactly one question get `FORMERR`.
//! 2. Requests that aren't a `QUERY` for `IN SOA`, `IN AXFR` or `IN IXFR` at the zone apex get
//!    `NOTIMP`.
//! 3. The SOA is fetched from the [`ZoneProvider`] and sent. SOA queries end here.
//! 4. For AXFR/IXFR the body records are streamed in batches, followed by the SOA again.
//!
//! A provider failure is answered with `SERVFAIL` and leaves the connection usable.

use super::batcher::RecordBatcher;
use super::codec::{MessageReader, MessageWriter};
use super::provider::{Context, DynZoneProvider, Emitter, ZoneProvider};
use super::server::TransferSettings;
use crate::error::Error;
use arc_swap::ArcSwap;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, info};
use trust_dns_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use trust_dns_proto::rr::{DNSClass, Name, RData, Record, RecordType};

pub(crate) struct Session<R, W> {
    ctx: Context,
    zone: Name,
    provider: DynZoneProvider,
    settings: Arc<ArcSwap<TransferSettings>>,
    reader: MessageReader<R>,
    responder: Responder<W>,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub(crate) fn new(
        ctx: Context,
        zone: Name,
        provider: DynZoneProvider,
        settings: Arc<ArcSwap<TransferSettings>>,
        reader: MessageReader<R>,
        writer: MessageWriter<W>,
    ) -> Self {
        Self {
            ctx,
            zone,
            provider,
            settings,
            reader,
            responder: Responder {
                writer,
                hung_up: false,
            },
        }
    }

    /// Answer requests until the peer closes the connection.
    ///
    /// # Errors
    ///
    /// Returns the codec, transport or log hook error that ended the connection early.
    pub(crate) async fn run(mut self) -> Result<(), Error> {
        while let Some(request) = self.reader.read_message().await? {
            // Settings may change between requests, never during one.
            let settings = **self.settings.load();
            self.responder
                .writer
                .set_packet_size(settings.packet_size);
            self.handle(&request, settings).await?;
            if self.responder.hung_up {
                break;
            }
        }
        Ok(())
    }

    async fn handle(&mut self, request: &Message, settings: TransferSettings) -> Result<(), Error> {
        if request.queries().len() != 1 {
            debug!(
                "FORMERR for request {} with {} questions",
                request.id(),
                request.queries().len()
            );
            return self
                .responder
                .send(&error_response(request, ResponseCode::FormErr))
                .await;
        }

        self.provider
            .log_request(&self.ctx, request)
            .map_err(Error::LogHook)?;

        let query = &request.queries()[0];
        if !self.is_supported(request, query) {
            debug!(
                "NOTIMP for request {}: {:?} {:?}",
                request.id(),
                request.op_code(),
                query
            );
            return self
                .responder
                .send(&error_response(request, ResponseCode::NotImp))
                .await;
        }

        let soa = match self.provider.soa(&self.ctx, request).await {
            Ok(soa) => soa,
            Err(error) => {
                self.provider
                    .transfer_failed(&self.ctx, request, query, &error);
                return self
                    .responder
                    .send(&error_response(request, ResponseCode::ServFail))
                    .await;
            }
        };

        let mut response = response_to(request);
        response.set_authoritative(true).add_answer(soa.clone());
        self.responder.send(&response).await?;

        if query.query_type() == RecordType::SOA {
            return Ok(());
        }

        let serial = ixfr_serial(request, query);
        info!(
            "{} of {} requested (serial {:?})",
            query.query_type(),
            query.name(),
            serial
        );
        self.stream_body(request, query, &soa, serial, settings.batch_size)
            .await
    }

    fn is_supported(&self, request: &Message, query: &Query) -> bool {
        request.op_code() == OpCode::Query
            && query.query_class() == DNSClass::IN
            && query.name().eq_case(&self.zone)
            && matches!(
                query.query_type(),
                RecordType::SOA | RecordType::AXFR | RecordType::IXFR
            )
    }

    async fn stream_body(
        &mut self,
        request: &Message,
        query: &Query,
        soa: &Record,
        serial: Option<u32>,
        batch_size: usize,
    ) -> Result<(), Error> {
        let Self {
            ctx,
            provider,
            responder,
            ..
        } = self;

        let (tx, mut rx) = mpsc::channel(batch_size.max(1));
        let mut batcher = RecordBatcher::new(batch_size);
        let mut sent = 0usize;

        let producer = provider.body(ctx, request, query, soa, serial, Emitter::new(tx));
        tokio::pin!(producer);

        let outcome = loop {
            tokio::select! {
                biased;
                Some(record) = rx.recv() => {
                    if let Some(batch) = batcher.push(record) {
                        sent += batch.len();
                        responder.send(&batch_response(request, batch)).await?;
                    }
                }
                outcome = &mut producer => break outcome,
            }
        };

        // Anything emitted before the producer finished still goes through the batcher.
        rx.close();
        while let Ok(record) = rx.try_recv() {
            if let Some(batch) = batcher.push(record) {
                sent += batch.len();
                responder.send(&batch_response(request, batch)).await?;
            }
        }

        match outcome {
            Ok(()) => {
                if let Some(batch) = batcher.finish() {
                    sent += batch.len();
                    responder.send(&batch_response(request, batch)).await?;
                }
                responder
                    .send(&batch_response(request, vec![soa.clone()]))
                    .await?;
                info!("{} of {} complete, {sent} records", query.query_type(), query.name());
                Ok(())
            }
            Err(error) => {
                let dropped = batcher.discard();
                debug!("dropped {dropped} pending records after producer failure");
                provider.transfer_failed(ctx, request, query, &error);
                let mut failure = stream_response(request);
                failure.set_response_code(ResponseCode::ServFail);
                responder.send(&failure).await
            }
        }
    }
}

/// The write side of a session. Once the peer hangs up, further responses are dropped.
struct Responder<W> {
    writer: MessageWriter<W>,
    hung_up: bool,
}

impl<W: AsyncWrite + Unpin> Responder<W> {
    async fn send(&mut self, message: &Message) -> Result<(), Error> {
        if self.hung_up {
            return Ok(());
        }
        match self.writer.write_message(message).await {
            // Secondaries commonly close the connection as soon as the first response tells
            // them their copy is current.
            Err(Error::IO(err)) if peer_hung_up(&err) => {
                debug!("peer hung up: {err}");
                self.hung_up = true;
                Ok(())
            }
            res => res,
        }
    }
}

fn peer_hung_up(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
    )
}

/// A response echoing the request id and question.
fn response_to(request: &Message) -> Message {
    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .add_queries(request.queries().to_vec());
    response
}

fn error_response(request: &Message, code: ResponseCode) -> Message {
    let mut response = response_to(request);
    response.set_response_code(code);
    response
}

/// A follow-up response in a transfer stream. These carry no question section.
fn stream_response(request: &Message) -> Message {
    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_authoritative(true);
    response
}

fn batch_response(request: &Message, records: Vec<Record>) -> Message {
    let mut response = stream_response(request);
    response.insert_answers(records);
    response
}

/// The serial an IXFR request carries in the SOA of its authority section.
fn ixfr_serial(request: &Message, query: &Query) -> Option<u32> {
    if query.query_type() != RecordType::IXFR {
        return None;
    }
    match request.name_servers().first().and_then(Record::data) {
        Some(RData::SOA(soa)) => Some(soa.serial()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::codec::DEFAULT_PACKET_SIZE;
    use std::net::Ipv4Addr;
    use std::str::FromStr;
    use std::sync::Mutex;
    use tokio::io::{duplex, split, DuplexStream, ReadHalf, WriteHalf};
    use tokio::task::JoinHandle;
    use trust_dns_proto::rr::rdata::SOA;

    #[derive(Default)]
    struct ScriptedZone {
        records: u8,
        fail_soa: bool,
        fail_body: bool,
        fail_log: bool,
        serials: Mutex<Vec<Option<u32>>>,
        failures: Mutex<Vec<String>>,
        leaked: Mutex<Option<Emitter>>,
    }

    fn zone() -> Name {
        Name::from_str("test.lan.").unwrap()
    }

    fn soa_record(serial: u32) -> Record {
        Record::from_rdata(
            zone(),
            3600,
            RData::SOA(SOA::new(
                Name::from_str("ns1.test.lan.").unwrap(),
                Name::from_str("admin.test.lan.").unwrap(),
                serial,
                86_400,
                7_200,
                3_600_000,
                172_800,
            )),
        )
    }

    fn a_record(last_octet: u8) -> Record {
        Record::from_rdata(
            Name::from_str("host.test.lan.").unwrap(),
            60,
            RData::A(Ipv4Addr::new(10, 0, 0, last_octet)),
        )
    }

    #[async_trait::async_trait]
    impl ZoneProvider for ScriptedZone {
        fn log_request(&self, _ctx: &Context, _request: &Message) -> anyhow::Result<()> {
            if self.fail_log {
                anyhow::bail!("log sink unavailable");
            }
            Ok(())
        }

        async fn soa(&self, _ctx: &Context, _request: &Message) -> anyhow::Result<Record> {
            if self.fail_soa {
                anyhow::bail!("no SOA today");
            }
            Ok(soa_record(2023_03_12))
        }

        async fn body(
            &self,
            _ctx: &Context,
            _request: &Message,
            _query: &Query,
            _soa: &Record,
            serial: Option<u32>,
            emitter: Emitter,
        ) -> anyhow::Result<()> {
            self.serials.lock().unwrap().push(serial);
            for i in 1..=self.records {
                emitter.emit(a_record(i)).await;
                tokio::task::yield_now().await;
            }
            *self.leaked.lock().unwrap() = Some(emitter);
            if self.fail_body {
                anyhow::bail!("zone store went away");
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

    struct Client {
        reader: MessageReader<ReadHalf<DuplexStream>>,
        writer: MessageWriter<WriteHalf<DuplexStream>>,
        session: JoinHandle<Result<(), Error>>,
    }

    fn start(provider: Arc<ScriptedZone>, batch_size: usize) -> Client {
        let (client, server) = duplex(1024);
        let (server_read, server_write) = split(server);
        let settings = Arc::new(ArcSwap::from_pointee(TransferSettings {
            batch_size,
            packet_size: DEFAULT_PACKET_SIZE,
        }));
        let ctx = Context {
            peer: "127.0.0.1:5353".parse().unwrap(),
            slave: None,
        };
        let session = Session::new(
            ctx,
            zone(),
            provider,
            settings,
            MessageReader::new(server_read),
            MessageWriter::new(server_write, DEFAULT_PACKET_SIZE),
        );
        let session = tokio::spawn(session.run());
        let (client_read, client_write) = split(client);
        Client {
            reader: MessageReader::new(client_read),
            writer: MessageWriter::new(client_write, DEFAULT_PACKET_SIZE),
            session,
        }
    }

    fn request(id: u16, name: &str, record_type: RecordType) -> Message {
        let mut message = Message::new();
        message
            .set_id(id)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .add_query(Query::query(Name::from_ascii(name).unwrap(), record_type));
        message
    }

    impl Client {
        async fn ask(&mut self, message: &Message) -> Message {
            self.writer.write_message(message).await.unwrap();
            self.next().await
        }

        async fn next(&mut self) -> Message {
            self.reader.read_message().await.unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn formerr_for_zero_or_many_questions() {
        let mut client = start(Arc::new(ScriptedZone::default()), 20);

        let mut none = request(11, "test.lan.", RecordType::SOA);
        none.take_queries();
        let response = client.ask(&none).await;
        assert_eq!(response.id(), 11);
        assert_eq!(response.message_type(), MessageType::Response);
        assert_eq!(response.response_code(), ResponseCode::FormErr);

        let mut two = request(12, "test.lan.", RecordType::SOA);
        two.add_query(Query::query(zone(), RecordType::AXFR));
        let response = client.ask(&two).await;
        assert_eq!(response.id(), 12);
        assert_eq!(response.response_code(), ResponseCode::FormErr);
        assert_eq!(response.queries().len(), 2);
    }

    #[tokio::test]
    async fn notimp_for_unsupported_requests() {
        let mut client = start(Arc::new(ScriptedZone::default()), 20);

        let mut update = request(1, "test.lan.", RecordType::SOA);
        update.set_op_code(OpCode::Update);
        let mut chaos = request(2, "test.lan.", RecordType::SOA);
        let mut query = Query::query(zone(), RecordType::SOA);
        query.set_query_class(DNSClass::CH);
        chaos.take_queries();
        chaos.add_query(query);

        let cases = vec![
            update,
            chaos,
            request(3, "other.lan.", RecordType::AXFR),
            request(4, "TEST.lan.", RecordType::AXFR),
            request(5, "test.lan.", RecordType::A),
        ];
        for case in cases {
            let response = client.ask(&case).await;
            assert_eq!(response.id(), case.id());
            assert_eq!(response.response_code(), ResponseCode::NotImp, "{case:?}");
            assert!(response.answers().is_empty());
        }
    }

    #[tokio::test]
    async fn soa_query_gets_single_authoritative_answer() {
        let mut client = start(Arc::new(ScriptedZone::default()), 20);
        let response = client.ask(&request(7, "test.lan.", RecordType::SOA)).await;
        assert_eq!(response.id(), 7);
        assert!(response.authoritative());
        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert_eq!(response.answers(), &[soa_record(2023_03_12)]);

        // Nothing else follows: the next message answers the next request.
        let response = client.ask(&request(8, "test.lan.", RecordType::SOA)).await;
        assert_eq!(response.id(), 8);
    }

    #[tokio::test]
    async fn soa_failure_is_servfail_with_question() {
        let zone = Arc::new(ScriptedZone {
            fail_soa: true,
            ..ScriptedZone::default()
        });
        let mut client = start(zone.clone(), 20);
        let response = client.ask(&request(9, "test.lan.", RecordType::AXFR)).await;
        assert_eq!(response.response_code(), ResponseCode::ServFail);
        assert_eq!(response.queries().len(), 1);
        assert_eq!(zone.failures.lock().unwrap().as_slice(), ["no SOA today"]);
        assert!(zone.serials.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn axfr_streams_batches_between_soas() {
        let zone = Arc::new(ScriptedZone {
            records: 5,
            ..ScriptedZone::default()
        });
        let mut client = start(zone.clone(), 2);
        let first = client.ask(&request(21, "test.lan.", RecordType::AXFR)).await;
        assert_eq!(first.answers(), &[soa_record(2023_03_12)]);

        let mut octets = vec![];
        for expected_len in [2, 2, 1] {
            let batch = client.next().await;
            assert_eq!(batch.id(), 21);
            assert!(batch.authoritative());
            assert_eq!(batch.answers().len(), expected_len);
            for record in batch.answers() {
                match record.data() {
                    Some(RData::A(ip)) => octets.push(ip.octets()[3]),
                    other => panic!("unexpected {other:?}"),
                }
            }
        }
        assert_eq!(octets, vec![1, 2, 3, 4, 5]);

        let last = client.next().await;
        assert_eq!(last.answers(), &[soa_record(2023_03_12)]);
        assert_eq!(zone.serials.lock().unwrap().as_slice(), [None]);

        // Emitting after the transfer finished is ignored.
        let leaked = zone.leaked.lock().unwrap().take().unwrap();
        assert!(leaked.is_closed());
        assert!(!leaked.emit(a_record(99)).await);
    }

    #[tokio::test]
    async fn body_failure_is_servfail_without_closing_soa() {
        let zone = Arc::new(ScriptedZone {
            records: 3,
            fail_body: true,
            ..ScriptedZone::default()
        });
        let mut client = start(zone.clone(), 20);
        let first = client.ask(&request(31, "test.lan.", RecordType::AXFR)).await;
        assert_eq!(first.answers().len(), 1);

        let failure = client.next().await;
        assert_eq!(failure.id(), 31);
        assert!(failure.authoritative());
        assert_eq!(failure.response_code(), ResponseCode::ServFail);
        assert!(failure.answers().is_empty());
        assert_eq!(
            zone.failures.lock().unwrap().as_slice(),
            ["zone store went away"]
        );

        // The connection stays usable.
        let response = client.ask(&request(32, "test.lan.", RecordType::SOA)).await;
        assert_eq!(response.id(), 32);
        assert_eq!(response.response_code(), ResponseCode::NoError);
    }

    #[tokio::test]
    async fn ixfr_passes_client_serial() {
        let zone = Arc::new(ScriptedZone::default());
        let mut client = start(zone.clone(), 20);

        let mut ixfr = request(41, "test.lan.", RecordType::IXFR);
        ixfr.add_name_server(soa_record(2023_01_01));
        client.ask(&ixfr).await;
        let closing = client.next().await;
        assert_eq!(closing.answers(), &[soa_record(2023_03_12)]);

        client.ask(&request(42, "test.lan.", RecordType::IXFR)).await;
        client.next().await;

        assert_eq!(
            zone.serials.lock().unwrap().as_slice(),
            [Some(2023_01_01), None]
        );
    }

    #[tokio::test]
    async fn log_hook_failure_ends_the_session() {
        let zone = Arc::new(ScriptedZone {
            fail_log: true,
            ..ScriptedZone::default()
        });
        let mut client = start(zone, 20);
        client
            .writer
            .write_message(&request(51, "test.lan.", RecordType::SOA))
            .await
            .unwrap();
        assert!(client.reader.read_message().await.unwrap().is_none());
        assert!(matches!(client.session.await.unwrap(), Err(Error::LogHook(_))));
    }

    #[tokio::test]
    async fn peer_hanging_up_mid_transfer_is_not_an_error() {
        let zone = Arc::new(ScriptedZone {
            records: 200,
            ..ScriptedZone::default()
        });
        let mut client = start(zone.clone(), 1);
        let first = client.ask(&request(61, "test.lan.", RecordType::AXFR)).await;
        assert_eq!(first.answers(), &[soa_record(2023_03_12)]);

        let Client {
            reader,
            writer,
            session,
        } = client;
        drop(writer);
        drop(reader);

        assert!(session.await.unwrap().is_ok());
        // The producer still ran to the end with nobody listening.
        assert!(zone.leaked.lock().unwrap().is_some());
        assert!(zone.failures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn session_ends_cleanly_when_peer_closes() {
        let client = start(Arc::new(ScriptedZone::default()), 20);
        let Client {
            reader,
            writer,
            session,
        } = client;
        drop(writer);
        drop(reader);
        assert!(session.await.unwrap().is_ok());
    }
}
