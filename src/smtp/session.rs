//! The per-connection session state machine (spec.md §3, §4.3).
//!
//! Generic over the reader/writer types, exactly like the teacher's
//! `SmtpProtocol<R, W>` in `smtp_protocol.rs` — this lets the state machine
//! be unit-tested against in-memory buffers without a real socket, while the
//! server wires it up to a real `TcpStream` in production.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::reply::{Response, ReplyCatalog};
use crate::smtp::parser::{self, Command};
use crate::smtp::transaction::Transaction;
use crate::store::TransactionSink;

/// Idle read deadline per spec.md §5: RFC 5321 §4.5.3.2.7 recommends at
/// least 5 minutes.
const IDLE_READ_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Grace window after the stop signal fires before an in-flight read is
/// forced to time out (spec.md §5: "within ≤30s").
const SHUTDOWN_READ_GRACE: Duration = Duration::from_secs(30);

/// The state of a [`Session`]. Initial state is `Initiated`; `Closed` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initiated,
    Ready,
    Busy,
    Closed,
}

/// Why a line read ended without producing a line.
enum ReadOutcome {
    Line(String),
    /// The connection was closed by the peer.
    Eof,
}

enum ReadError {
    /// The 5-minute idle deadline elapsed with no shutdown in progress.
    IdleTimeout,
    /// The stop signal fired and the shutdown grace window then elapsed.
    ShutdownTimeout,
    Io(std::io::Error),
}

/// Why reading a DATA body line failed. Distinct from [`ReadError`] because,
/// unlike a command-line read, an EOF mid-body is not a clean close — it is
/// a lost connection (spec.md §7 Transport: lost ⇒ internal `221` then
/// close), not the `451` a plain transient I/O error gets.
enum DataReadError {
    IdleTimeout,
    ShutdownTimeout,
    /// The peer closed the connection before sending the `.` terminator.
    Eof,
    Io(std::io::Error),
}

impl From<ReadError> for DataReadError {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::IdleTimeout => DataReadError::IdleTimeout,
            ReadError::ShutdownTimeout => DataReadError::ShutdownTimeout,
            ReadError::Io(e) => DataReadError::Io(e),
        }
    }
}

/// One TCP dialogue. Owns its [`Transaction`] exclusively (spec.md §9: no
/// aliasing between Session and Transaction) and drives it while consuming
/// lines from the connection and emitting [`Response`]s.
pub struct Session<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    reader: R,
    writer: W,
    state: SessionState,
    client: Option<String>,
    current: Option<Transaction>,
    catalog: Arc<ReplyCatalog>,
    sink: Arc<dyn TransactionSink>,
}

impl<R, W> Session<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(
        reader: R,
        writer: W,
        catalog: Arc<ReplyCatalog>,
        sink: Arc<dyn TransactionSink>,
    ) -> Self {
        Self {
            reader,
            writer,
            state: SessionState::Initiated,
            client: None,
            current: None,
            catalog,
            sink,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drives the dialogue until the client quits, the connection is lost,
    /// a read times out, or `stop` fires and the shutdown grace window
    /// elapses. Recoverable conditions are mapped to responses internally;
    /// nothing but a programmer-error panic escapes this function, per
    /// spec.md §7's propagation policy.
    pub async fn serve(&mut self, stop: CancellationToken) {
        if self.state == SessionState::Closed {
            let resp = self.catalog.service_not_available();
            let _ = self.write_response(&resp).await;
            return;
        }

        let greeting = self.catalog.ready();
        if self.write_response(&greeting).await.is_err() {
            self.quit_internal();
            return;
        }

        loop {
            trace!("session({:?}): waiting for command", self.state);
            match self.read_line(&stop).await {
                Ok(ReadOutcome::Eof) => {
                    info!("connection closed by client (EOF)");
                    let closing = self.catalog.closing();
                    let _ = self.write_response(&closing).await;
                    self.quit_internal();
                    return;
                }
                Ok(ReadOutcome::Line(line)) => {
                    if self.handle_line(&line, &stop).await.is_err() {
                        // A response write failed, or the DATA body read was
                        // cut short by a timeout/shutdown/lost connection.
                        // quit_internal aborts any in-flight transaction and
                        // publishes it before closing, per spec.md §4.3: any
                        // write error "runs quit internally" rather than
                        // silently dropping the capture (spec.md §7).
                        self.quit_internal();
                        return;
                    }
                }
                Err(ReadError::IdleTimeout) => {
                    let resp = self.catalog.session_timed_out();
                    let _ = self.write_response(&resp).await;
                    self.quit_internal();
                    return;
                }
                Err(ReadError::ShutdownTimeout) => {
                    let resp = self.catalog.service_not_available();
                    let _ = self.write_response(&resp).await;
                    self.quit_internal();
                    return;
                }
                Err(ReadError::Io(e)) => {
                    warn!("read error: {e}");
                    let resp = self.catalog.protocol_abort();
                    if self.write_response(&resp).await.is_err() {
                        self.quit_internal();
                        return;
                    }
                }
            }

            self.publish_if_terminal();

            if self.state == SessionState::Closed {
                return;
            }
        }
    }

    /// Handles one received line: parse, dispatch, respond, publish a
    /// terminal transaction if the command cycle produced one. Returns
    /// `Err(())` if a response write failed, or if the DATA body read was
    /// cut short by a timeout, shutdown, or lost connection; either way the
    /// caller must run `quit_internal` and end the session.
    async fn handle_line(&mut self, line: &str, stop: &CancellationToken) -> Result<(), ()> {
        debug!("session({:?}): processing {line:?}", self.state);

        let cmd = match parser::parse(line) {
            Ok(cmd) => cmd,
            Err(resp) => {
                return self.write_response(&resp).await.map_err(|_| ());
            }
        };

        match cmd.name.as_str() {
            "HELO" | "EHLO" => {
                let resp = self.handle_hello(&cmd);
                self.write_response(&resp).await.map_err(|_| ())
            }
            "MAIL" => {
                let resp = self.handle_mail(&cmd);
                self.write_response(&resp).await.map_err(|_| ())
            }
            "RCPT" => {
                let resp = self.handle_rcpt(&cmd);
                self.write_response(&resp).await.map_err(|_| ())
            }
            "NOOP" => {
                let resp = self.catalog.success();
                self.write_response(&resp).await.map_err(|_| ())
            }
            "RSET" => {
                let resp = self.handle_rset();
                self.write_response(&resp).await.map_err(|_| ())
            }
            "VRFY" => {
                let resp = self.catalog.not_implemented();
                self.write_response(&resp).await.map_err(|_| ())
            }
            "QUIT" => {
                let resp = self.handle_quit();
                self.write_response(&resp).await.map_err(|_| ())
            }
            "DATA" => self.handle_data(&cmd, stop).await,
            other => unreachable!("parser only yields table verbs, got {other:?}"),
        }
    }

    fn handle_hello(&mut self, cmd: &Command) -> Response {
        self.client = cmd.positional.first().cloned();
        if self.state == SessionState::Initiated {
            self.state = SessionState::Ready;
        }
        // Ready and Busy: client is (re)recorded, state unchanged. The Busy
        // case is the lenient choice from spec.md §9's open question — an
        // in-progress transaction is left untouched.
        self.catalog.success()
    }

    fn handle_mail(&mut self, cmd: &Command) -> Response {
        if self.state != SessionState::Ready {
            return self.catalog.bad_sequence();
        }

        let mut tx = Transaction::new();
        let response = tx
            .process(cmd, &self.catalog)
            .expect("a fresh transaction always accepts its first command");

        if !response.is_error() {
            self.state = SessionState::Busy;
            self.current = Some(tx);
        }
        response
    }

    fn handle_rcpt(&mut self, cmd: &Command) -> Response {
        if self.state != SessionState::Busy {
            return self.catalog.bad_sequence();
        }
        let tx = self
            .current
            .as_mut()
            .expect("Busy implies a current transaction (I2)");
        tx.process(cmd, &self.catalog)
            .unwrap_or_else(|_| self.catalog.bad_sequence())
    }

    fn handle_rset(&mut self) -> Response {
        if let Some(tx) = self.current.as_mut() {
            let _ = tx.abort();
        }
        self.state = match self.client {
            Some(_) => SessionState::Ready,
            None => SessionState::Initiated,
        };
        self.catalog.success()
    }

    fn handle_quit(&mut self) -> Response {
        if let Some(tx) = self.current.as_mut() {
            let _ = tx.abort();
        }
        self.state = SessionState::Closed;
        self.catalog.closing()
    }

    async fn handle_data(&mut self, cmd: &Command, stop: &CancellationToken) -> Result<(), ()> {
        if self.state != SessionState::Busy {
            let resp = self.catalog.bad_sequence();
            return self.write_response(&resp).await.map_err(|_| ());
        }

        let recipients_empty = self
            .current
            .as_ref()
            .expect("Busy implies a current transaction (I2)")
            .mail
            .envelope
            .recipients
            .is_empty();

        if recipients_empty {
            let resp = self.catalog.no_valid_recipients();
            return self.write_response(&resp).await.map_err(|_| ());
        }

        let interim = {
            let tx = self.current.as_mut().expect("checked above");
            tx.process(cmd, &self.catalog)
                .unwrap_or_else(|_| self.catalog.bad_sequence())
        };
        self.write_response(&interim).await.map_err(|_| ())?;

        let lines = match self.read_dot_terminated_body(stop).await {
            Ok(lines) => lines,
            Err(DataReadError::IdleTimeout) => {
                let resp = self.catalog.session_timed_out();
                let _ = self.write_response(&resp).await;
                return Err(());
            }
            Err(DataReadError::ShutdownTimeout) => {
                let resp = self.catalog.service_not_available();
                let _ = self.write_response(&resp).await;
                return Err(());
            }
            Err(DataReadError::Eof) => {
                info!("connection closed by client during DATA body (EOF)");
                let resp = self.catalog.closing();
                let _ = self.write_response(&resp).await;
                return Err(());
            }
            Err(DataReadError::Io(e)) => {
                warn!("read error during DATA body: {e}");
                let resp = self.catalog.protocol_abort();
                let _ = self.write_response(&resp).await;
                return Err(());
            }
        };

        let final_resp = {
            let tx = self.current.as_mut().expect("checked above");
            tx.data(lines, &self.catalog)
                .unwrap_or_else(|_| self.catalog.protocol_abort())
        };
        self.write_response(&final_resp).await.map_err(|_| ())?;

        self.state = SessionState::Ready;
        Ok(())
    }

    /// Reads lines until a bare `.` terminator, applying SMTP dot-stuffing:
    /// a line beginning with `..` has one leading dot stripped. The
    /// terminator itself is not included in the returned content.
    async fn read_dot_terminated_body(
        &mut self,
        stop: &CancellationToken,
    ) -> Result<Vec<String>, DataReadError> {
        let mut lines = Vec::new();
        loop {
            match self.read_line(stop).await? {
                ReadOutcome::Eof => return Err(DataReadError::Eof),
                ReadOutcome::Line(line) => {
                    if line == "." {
                        return Ok(lines);
                    }
                    if let Some(stripped) = line.strip_prefix("..") {
                        lines.push(format!(".{stripped}"));
                    } else {
                        lines.push(line);
                    }
                }
            }
        }
    }

    /// Publishes the current transaction to the sink and drops the
    /// reference if it has reached a terminal state, per spec.md §4.3's
    /// transaction-handoff rule. Sink failures are logged, never
    /// surfaced.
    fn publish_if_terminal(&mut self) {
        if matches!(self.current.as_ref().map(|t| t.state.is_terminal()), Some(true)) {
            let tx = self.current.take().expect("checked Some above");
            self.sink.store(tx);
        }
    }

    /// Aborts any current transaction and marks the session closed, without
    /// further I/O. Used on unrecoverable transport/timeout/write-failure
    /// paths per spec.md §7.
    fn quit_internal(&mut self) {
        if let Some(tx) = self.current.as_mut() {
            let _ = tx.abort();
        }
        self.publish_if_terminal();
        self.state = SessionState::Closed;
    }

    async fn write_response(&mut self, resp: &Response) -> std::io::Result<()> {
        trace!("session write: {resp}");
        self.writer.write_all(resp.to_wire().as_bytes()).await?;
        self.writer.flush().await
    }

    async fn read_line(&mut self, stop: &CancellationToken) -> Result<ReadOutcome, ReadError> {
        tokio::select! {
            biased;
            res = tokio::time::timeout(IDLE_READ_TIMEOUT, self.read_raw_line()) => {
                match res {
                    Ok(Ok(outcome)) => Ok(outcome),
                    Ok(Err(e)) => Err(ReadError::Io(e)),
                    Err(_elapsed) => Err(ReadError::IdleTimeout),
                }
            }
            _ = stop.cancelled() => {
                match tokio::time::timeout(SHUTDOWN_READ_GRACE, self.read_raw_line()).await {
                    Ok(Ok(outcome)) => Ok(outcome),
                    Ok(Err(e)) => Err(ReadError::Io(e)),
                    Err(_elapsed) => Err(ReadError::ShutdownTimeout),
                }
            }
        }
    }

    async fn read_raw_line(&mut self) -> std::io::Result<ReadOutcome> {
        let mut buf = String::new();
        let n = self.reader.read_line(&mut buf).await?;
        if n == 0 {
            return Ok(ReadOutcome::Eof);
        }
        let line = buf.trim_end_matches(['\r', '\n']).to_string();
        Ok(ReadOutcome::Line(line))
    }
}
