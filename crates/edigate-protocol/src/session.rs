//! The record session engine.

use std::io::{self, Read, Write};

use tracing::{debug, warn};

use edigate_config::SocketEndpoint;

use crate::SESSION_TARGET;
use crate::errors::TransportError;
use crate::record::{FIELD_SEPARATOR, Record, RecordStream, SENTINEL};
use crate::stream::SessionStream;

/// Ceiling on one record line, including the terminator.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Ceiling on one outcome message payload.
const MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Two-part reply issued by the receiving side once a record stream has
/// been consumed: an action code and a human-readable response message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Action the receiving side took, e.g. `Receipt` or `ERROR`.
    pub action_code: String,
    /// Free-text response for the result document and the operator.
    pub response_message: String,
}

impl SessionOutcome {
    /// Builds an outcome from its two parts.
    #[must_use]
    pub fn new(action_code: impl Into<String>, response_message: impl Into<String>) -> Self {
        Self {
            action_code: action_code.into(),
            response_message: response_message.into(),
        }
    }
}

/// Request/response protocol engine over a point-to-point byte stream.
///
/// One session owns its stream exclusively for the duration of the
/// exchange. Record lines are newline-framed; outcome messages carry a
/// four-byte big-endian length prefix (the transport layer's own length
/// signalling) and each read must yield exactly the announced byte count.
#[derive(Debug)]
pub struct RecordSession<S> {
    stream: S,
    read_buffer: Vec<u8>,
    skipped_lines: u64,
}

impl RecordSession<SessionStream> {
    /// Dials the peer endpoint and wraps the connection in a session.
    ///
    /// # Errors
    ///
    /// Fails with a [`TransportError`] whose operation is `connect` when
    /// the peer refuses or the endpoint is unreachable. The session never
    /// retries; redial policy belongs to the caller.
    pub fn connect(endpoint: &SocketEndpoint) -> Result<Self, TransportError> {
        let stream = SessionStream::connect(endpoint)
            .map_err(|source| TransportError::new("connect", source))?;
        debug!(
            target: SESSION_TARGET,
            endpoint = %endpoint,
            "session connected"
        );
        Ok(Self::new(stream))
    }
}

impl<S: Read + Write> RecordSession<S> {
    /// Wraps an already-connected stream.
    #[must_use]
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_buffer: Vec::new(),
            skipped_lines: 0,
        }
    }

    /// Consumes the session, returning the underlying stream.
    #[must_use]
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Count of malformed record lines skipped under the leniency policy.
    #[must_use]
    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines
    }

    /// Sends an ordered record stream followed by the sentinel.
    ///
    /// Each record is flushed as it is written, so every record is on the
    /// wire before the sentinel.
    ///
    /// # Errors
    ///
    /// Fails with a [`TransportError`] on any write or flush failure.
    pub fn send(&mut self, records: &[Record]) -> Result<(), TransportError> {
        for record in records {
            let line = format!("{}{}{}\n", record.key(), FIELD_SEPARATOR, record.value());
            self.write_flushed("send record", line.as_bytes())?;
        }
        self.write_flushed("send sentinel", format!("{SENTINEL}\n").as_bytes())?;
        debug!(
            target: SESSION_TARGET,
            records = records.len(),
            "record stream sent"
        );
        Ok(())
    }

    /// Reads record lines until the sentinel (exclusive).
    ///
    /// Lines with zero or more than one field separator are malformed;
    /// under the leniency policy they are counted, logged, and skipped
    /// rather than failing the session.
    ///
    /// # Errors
    ///
    /// Fails with a [`TransportError`] when the peer closes the stream
    /// before the sentinel or a read fails.
    pub fn receive(&mut self) -> Result<RecordStream, TransportError> {
        let mut records = Vec::new();
        loop {
            let line = self.read_line("receive record")?;
            if line == SENTINEL {
                break;
            }
            match parse_record_line(&line) {
                Some(record) => records.push(record),
                None => {
                    self.skipped_lines += 1;
                    warn!(
                        target: SESSION_TARGET,
                        line = %line,
                        skipped = self.skipped_lines,
                        "skipping malformed record line"
                    );
                }
            }
        }
        debug!(
            target: SESSION_TARGET,
            records = records.len(),
            skipped = self.skipped_lines,
            "record stream received"
        );
        Ok(records)
    }

    /// Receives the two-part outcome that follows a sent stream.
    ///
    /// # Errors
    ///
    /// Fails with a [`TransportError`] when either message cannot be read
    /// in full.
    pub fn await_outcome(&mut self) -> Result<SessionOutcome, TransportError> {
        let action_code = self.read_message("receive action")?;
        let response_message = self.read_message("receive response")?;
        Ok(SessionOutcome {
            action_code,
            response_message,
        })
    }

    /// Sends the two-part outcome after a received stream.
    ///
    /// # Errors
    ///
    /// Fails with a [`TransportError`] on any write or flush failure.
    pub fn send_outcome(&mut self, outcome: &SessionOutcome) -> Result<(), TransportError> {
        self.write_message("send action", &outcome.action_code)?;
        self.write_message("send response", &outcome.response_message)
    }

    fn write_flushed(&mut self, operation: &'static str, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream
            .write_all(bytes)
            .and_then(|()| self.stream.flush())
            .map_err(|source| TransportError::new(operation, source))
    }

    fn write_message(&mut self, operation: &'static str, payload: &str) -> Result<(), TransportError> {
        let length = u32::try_from(payload.len()).map_err(|_| {
            TransportError::new(
                operation,
                io::Error::new(io::ErrorKind::InvalidInput, "outcome message too large"),
            )
        })?;
        self.stream
            .write_all(&length.to_be_bytes())
            .and_then(|()| self.stream.write_all(payload.as_bytes()))
            .and_then(|()| self.stream.flush())
            .map_err(|source| TransportError::new(operation, source))
    }

    /// Reads one newline-terminated line, without the terminator. A lone
    /// trailing carriage return is stripped for peers that send CRLF.
    fn read_line(&mut self, operation: &'static str) -> Result<String, TransportError> {
        loop {
            if let Some(position) = self.read_buffer.iter().position(|byte| *byte == b'\n') {
                let mut line: Vec<u8> = self.read_buffer.drain(..=position).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }
            if self.read_buffer.len() > MAX_LINE_BYTES {
                return Err(TransportError::new(
                    operation,
                    io::Error::new(io::ErrorKind::InvalidData, "record line exceeds maximum size"),
                ));
            }
            self.fill_buffer(operation)?;
        }
    }

    /// Reads one length-prefixed outcome message.
    fn read_message(&mut self, operation: &'static str) -> Result<String, TransportError> {
        let mut header = [0_u8; 4];
        self.read_exact_buffered(operation, &mut header)?;
        let length = u32::from_be_bytes(header) as usize;
        if length > MAX_MESSAGE_BYTES {
            return Err(TransportError::new(
                operation,
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    "outcome message exceeds maximum size",
                ),
            ));
        }
        let mut payload = vec![0_u8; length];
        self.read_exact_buffered(operation, &mut payload)?;
        String::from_utf8(payload).map_err(|_| {
            TransportError::new(
                operation,
                io::Error::new(io::ErrorKind::InvalidData, "outcome message is not valid UTF-8"),
            )
        })
    }

    /// Fills `target` exactly, draining buffered bytes before touching the
    /// stream so leftovers from line reads are not lost.
    fn read_exact_buffered(
        &mut self,
        operation: &'static str,
        target: &mut [u8],
    ) -> Result<(), TransportError> {
        let mut filled = 0;
        while filled < target.len() {
            if self.read_buffer.is_empty() {
                self.fill_buffer(operation)?;
            }
            let take = self.read_buffer.len().min(target.len() - filled);
            target[filled..filled + take].copy_from_slice(&self.read_buffer[..take]);
            self.read_buffer.drain(..take);
            filled += take;
        }
        Ok(())
    }

    /// Performs one raw read into the internal buffer, retrying on
    /// interruption. A zero-byte read means the peer closed the stream.
    fn fill_buffer(&mut self, operation: &'static str) -> Result<(), TransportError> {
        let mut chunk = [0_u8; 1024];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(TransportError::peer_closed(operation)),
                Ok(read) => {
                    self.read_buffer.extend_from_slice(&chunk[..read]);
                    return Ok(());
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => return Err(TransportError::new(operation, source)),
            }
        }
    }
}

fn parse_record_line(line: &str) -> Option<Record> {
    if line
        .bytes()
        .filter(|byte| *byte == FIELD_SEPARATOR as u8)
        .count()
        != 1
    {
        return None;
    }
    let (key, value) = line.split_once(FIELD_SEPARATOR)?;
    Record::new(key, value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    fn record(key: &str, value: &str) -> Record {
        Record::new(key, value).unwrap()
    }

    fn sample_stream() -> RecordStream {
        vec![
            record("Ordno", "P2-G-H41-701052"),
            record("ProjectNumber", "L414100153"),
            record("LineNumber", "1"),
            record("MaterialItemCode", "91G5999000378"),
            record("PODETL-UOM", ""),
        ]
    }

    fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind listener");
        let addr = listener.local_addr().expect("listener address");
        let client = TcpStream::connect(addr).expect("connect client");
        let (server, _) = listener.accept().expect("accept connection");
        (client, server)
    }

    #[test]
    fn round_trip_preserves_record_order() {
        let (client, server) = loopback_pair();
        let records = sample_stream();
        let sent = records.clone();
        let sender = thread::spawn(move || {
            let mut session = RecordSession::new(client);
            session.send(&sent).expect("send stream");
        });

        let mut session = RecordSession::new(server);
        let received = session.receive().expect("receive stream");
        sender.join().expect("join sender");

        assert_eq!(received, records);
        assert_eq!(session.skipped_lines(), 0);
    }

    #[test]
    fn send_emits_exactly_one_sentinel_and_nothing_after() {
        let mut session = RecordSession::new(Cursor::new(Vec::new()));
        session.send(&sample_stream()).expect("send stream");
        let bytes = session.into_inner().into_inner();
        let text = String::from_utf8(bytes).expect("utf8 wire text");

        let sentinel_lines: Vec<_> = text.lines().filter(|line| *line == SENTINEL).collect();
        assert_eq!(sentinel_lines.len(), 1);
        assert!(text.ends_with(&format!("{SENTINEL}\n")));
    }

    #[test]
    fn malformed_lines_are_skipped_and_counted() {
        let wire = "Ordno=P2-G-H41-701052\nNOSEPARATOR\nQty=2=3\nCarrier=FEDEX\nEDIEOF\n";
        let mut session = RecordSession::new(Cursor::new(wire.as_bytes().to_vec()));
        let received = session.receive().expect("receive stream");

        assert_eq!(
            received,
            vec![record("Ordno", "P2-G-H41-701052"), record("Carrier", "FEDEX")]
        );
        assert_eq!(session.skipped_lines(), 2);
    }

    #[test]
    fn crlf_terminated_lines_are_accepted() {
        let wire = "Ordno=A1\r\nEDIEOF\r\n";
        let mut session = RecordSession::new(Cursor::new(wire.as_bytes().to_vec()));
        let received = session.receive().expect("receive stream");
        assert_eq!(received, vec![record("Ordno", "A1")]);
    }

    #[test]
    fn outcome_exchange_round_trips() {
        let (client, server) = loopback_pair();
        let outcome = SessionOutcome::new("Receipt", "5 line items accepted");
        let reply = outcome.clone();
        let responder = thread::spawn(move || {
            let mut session = RecordSession::new(server);
            session.receive().expect("receive stream");
            session.send_outcome(&reply).expect("send outcome");
        });

        let mut session = RecordSession::new(client);
        session.send(&sample_stream()).expect("send stream");
        let received = session.await_outcome().expect("await outcome");
        responder.join().expect("join responder");

        assert_eq!(received, outcome);
    }

    #[test]
    fn empty_outcome_parts_round_trip() {
        let (client, server) = loopback_pair();
        let responder = thread::spawn(move || {
            let mut session = RecordSession::new(server);
            session
                .send_outcome(&SessionOutcome::new("OK", ""))
                .expect("send outcome");
        });

        let mut session = RecordSession::new(client);
        let received = session.await_outcome().expect("await outcome");
        responder.join().expect("join responder");

        assert_eq!(received, SessionOutcome::new("OK", ""));
    }

    #[test]
    fn peer_reset_before_sentinel_fails_the_session() {
        let (client, server) = loopback_pair();
        drop(client);

        let mut session = RecordSession::new(server);
        let error = session.receive().expect_err("receive should fail");
        assert_eq!(error.operation, "receive record");
    }

    #[test]
    fn truncated_outcome_fails_the_session() {
        let (mut client, server) = loopback_pair();
        use std::io::Write as _;
        // Announce eight bytes, deliver three, then hang up.
        client.write_all(&8_u32.to_be_bytes()).expect("write header");
        client.write_all(b"abc").expect("write partial payload");
        drop(client);

        let mut session = RecordSession::new(server);
        let error = session.await_outcome().expect_err("outcome should fail");
        assert_eq!(error.operation, "receive action");
        assert_eq!(error.source.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn connect_refused_is_a_transport_error() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind listener");
        let port = listener.local_addr().expect("listener address").port();
        drop(listener);

        let endpoint = edigate_config::SocketEndpoint::tcp("127.0.0.1", port);
        let error = RecordSession::connect(&endpoint).expect_err("connect should fail");
        assert_eq!(error.operation, "connect");
    }
}
