//! Minimal blocking IMAP4rev1 client over rustls.
//!
//! Only the handful of commands the collector needs: LOGIN, SELECT,
//! SEARCH, FETCH, STORE and LOGOUT. Responses are read line by line with
//! `{n}` literals pulled out as raw bytes.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rustls::{ClientConnection, StreamOwned};
use rustls_pki_types::ServerName;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use super::{Mailbox, SearchOutcome};
use crate::error::MailError;
use crate::model::DATE_FORMAT;

/// Socket read/write timeout.
const IO_TIMEOUT: Duration = Duration::from_secs(30);

type TlsStream = StreamOwned<ClientConnection, TcpStream>;

/// Completion status of a tagged response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
    Bad,
}

/// A complete server response to one tagged command.
#[derive(Debug, Default)]
pub struct Response {
    /// Untagged (`* ...`) lines, literals elided.
    pub untagged: Vec<String>,
    /// Literal payloads in the order they arrived.
    pub literals: Vec<Vec<u8>>,
    pub status: Option<Status>,
    /// Human-readable text after the tagged status.
    pub text: String,
}

impl Response {
    pub fn is_ok(&self) -> bool {
        self.status == Some(Status::Ok)
    }

    fn status_label(&self) -> String {
        match self.status {
            Some(Status::Ok) => "OK".into(),
            Some(Status::No) => format!("NO {}", self.text),
            Some(Status::Bad) => format!("BAD {}", self.text),
            None => "missing status".into(),
        }
    }
}

/// Read one CRLF-terminated line, without the terminator.
fn read_line<R: BufRead>(reader: &mut R) -> Result<Vec<u8>, MailError> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Err(MailError::ConnectionClosed);
    }
    while buf.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
        buf.pop();
    }
    Ok(buf)
}

/// Length of a trailing `{n}` literal marker, if the line ends with one.
fn literal_len(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"}")?;
    let open = line.iter().rposition(|b| *b == b'{')?;
    std::str::from_utf8(&line[open + 1..]).ok()?.parse().ok()
}

/// Read lines until the tagged completion for `tag` arrives.
pub fn read_response<R: BufRead>(reader: &mut R, tag: &str) -> Result<Response, MailError> {
    let mut response = Response::default();
    let tag_prefix = format!("{tag} ");

    loop {
        let mut line = read_line(reader)?;

        // Splice literals: the logical line continues after the literal bytes.
        while let Some(len) = literal_len(&line) {
            let mut literal = vec![0u8; len];
            reader.read_exact(&mut literal)?;
            response.literals.push(literal);
            let rest = read_line(reader)?;
            line.extend_from_slice(b" ");
            line.extend_from_slice(&rest);
        }

        let text = String::from_utf8_lossy(&line).into_owned();
        if let Some(rest) = text.strip_prefix(&tag_prefix) {
            let (status, detail) = rest.split_once(' ').unwrap_or((rest, ""));
            response.status = match status.to_ascii_uppercase().as_str() {
                "OK" => Some(Status::Ok),
                "NO" => Some(Status::No),
                "BAD" => Some(Status::Bad),
                other => {
                    return Err(MailError::Protocol(format!(
                        "unexpected completion status {other:?}"
                    )));
                }
            };
            response.text = detail.to_string();
            return Ok(response);
        }
        response.untagged.push(text);
    }
}

/// Quote a string argument for IMAP.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Parse the sequence numbers out of `* SEARCH` lines.
pub fn parse_search(untagged: &[String]) -> Vec<u32> {
    untagged
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace())
        .filter_map(|n| n.parse().ok())
        .collect()
}

/// Blocking IMAP session. Production sessions run over TLS.
pub struct ImapMailbox<S: Read + Write = TlsStream> {
    stream: BufReader<S>,
    tag_counter: u32,
}

impl ImapMailbox<TlsStream> {
    /// Open a TLS connection and consume the server greeting.
    pub fn connect(host: &str, port: u16) -> Result<Self, MailError> {
        let connect_err = |reason: String| MailError::Connect {
            host: host.to_string(),
            reason,
        };

        let tcp = TcpStream::connect((host, port)).map_err(|e| connect_err(e.to_string()))?;
        tcp.set_read_timeout(Some(IO_TIMEOUT))?;
        tcp.set_write_timeout(Some(IO_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name =
            ServerName::try_from(host.to_string()).map_err(|e| connect_err(e.to_string()))?;
        let conn = ClientConnection::new(tls_config, server_name)?;

        Self::open(StreamOwned::new(conn, tcp), host)
    }
}

impl<S: Read + Write> ImapMailbox<S> {
    /// Start a session on an established stream by reading the greeting.
    pub fn open(stream: S, host: &str) -> Result<Self, MailError> {
        let mut stream = BufReader::new(stream);
        let greeting = String::from_utf8_lossy(&read_line(&mut stream)?).into_owned();
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(MailError::Connect {
                host: host.to_string(),
                reason: format!("unexpected greeting: {greeting}"),
            });
        }
        debug!(host, "IMAP greeting received");

        Ok(Self {
            stream,
            tag_counter: 0,
        })
    }

    fn next_tag(&mut self) -> String {
        self.tag_counter += 1;
        format!("A{}", self.tag_counter)
    }

    /// Send a command and wait for its tagged completion.
    fn command(&mut self, cmd: &str) -> Result<Response, MailError> {
        let tag = self.next_tag();
        let full = format!("{tag} {cmd}\r\n");
        let inner = self.stream.get_mut();
        inner.write_all(full.as_bytes())?;
        inner.flush()?;
        read_response(&mut self.stream, &tag)
    }

    pub fn login(&mut self, user: &str, password: &SecretString) -> Result<(), MailError> {
        let resp = self.command(&format!(
            "LOGIN {} {}",
            quote(user),
            quote(password.expose_secret())
        ))?;
        if !resp.is_ok() {
            return Err(MailError::AuthFailed {
                user: user.to_string(),
                reason: resp.status_label(),
            });
        }
        Ok(())
    }

    pub fn select(&mut self, mailbox: &str) -> Result<(), MailError> {
        let resp = self.command(&format!("SELECT {}", quote(mailbox)))?;
        if !resp.is_ok() {
            return Err(MailError::SelectFailed {
                mailbox: mailbox.to_string(),
                reason: resp.status_label(),
            });
        }
        Ok(())
    }

    /// Best-effort LOGOUT; failures are only logged.
    pub fn logout(&mut self) {
        if let Err(e) = self.command("LOGOUT") {
            debug!("IMAP logout failed: {e}");
        }
    }
}

impl<S: Read + Write> Mailbox for ImapMailbox<S> {
    fn search_sent_since(&mut self, date: NaiveDate) -> Result<SearchOutcome, MailError> {
        let resp = self.command(&format!("SEARCH SENTSINCE {}", date.format(DATE_FORMAT)))?;
        if !resp.is_ok() {
            return Ok(SearchOutcome::Failed(resp.status_label()));
        }
        Ok(SearchOutcome::Found(parse_search(&resp.untagged)))
    }

    fn fetch(&mut self, seq: u32) -> Result<Option<Vec<u8>>, MailError> {
        let resp = self.command(&format!("FETCH {seq} (BODY.PEEK[])"))?;
        if !resp.is_ok() {
            warn!(seq, status = %resp.status_label(), "FETCH rejected");
            return Ok(None);
        }
        Ok(resp.literals.into_iter().next())
    }

    fn mark_seen(&mut self, seq: u32) -> Result<(), MailError> {
        let resp = self.command(&format!("STORE {seq} +FLAGS (\\Seen)"))?;
        if !resp.is_ok() {
            return Err(MailError::Protocol(format!(
                "STORE {seq} failed: {}",
                resp.status_label()
            )));
        }
        Ok(())
    }
}
