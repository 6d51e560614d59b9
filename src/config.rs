//! Configuration types.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::sheets::{ColumnLayout, RetryPolicy};

/// Default IMAPS port.
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// First identity handed out in a run.
pub const DEFAULT_ID_SEED: u64 = 10010;

/// Mailbox connection settings.
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// IMAP server host name.
    pub server: String,
    pub port: u16,
    pub username: String,
    /// Account password or app code.
    pub password: SecretString,
    /// Mailbox to select, e.g. `INBOX`.
    pub mailbox: String,
}

impl MailConfig {
    /// Accepts `host` or `host:port`; the port defaults to 993.
    pub fn new(
        server: &str,
        username: impl Into<String>,
        password: SecretString,
        mailbox: impl Into<String>,
    ) -> Self {
        let (host, port) = match server.rsplit_once(':') {
            Some((host, port)) => match port.parse() {
                Ok(port) => (host.to_string(), port),
                Err(_) => (server.to_string(), DEFAULT_IMAP_PORT),
            },
            None => (server.to_string(), DEFAULT_IMAP_PORT),
        };
        Self {
            server: host,
            port,
            username: username.into(),
            password,
            mailbox: mailbox.into(),
        }
    }
}

/// Remote spreadsheet settings.
#[derive(Debug, Clone)]
pub struct SheetConfig {
    /// Service account JSON key file.
    pub credentials_file: PathBuf,
    /// Spreadsheet title, as shown in Drive.
    pub spreadsheet: String,
    /// Zero-based worksheet index.
    pub worksheet_index: usize,
}

/// Local layout and synchronization parameters.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Where accepted attachments are staged.
    pub staging_dir: PathBuf,
    /// Where credential images are written.
    pub output_dir: PathBuf,
    pub id_seed: u64,
    pub columns: ColumnLayout,
    pub retry: RetryPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from(".attachments"),
            output_dir: PathBuf::from("qr_codes"),
            id_seed: DEFAULT_ID_SEED,
            columns: ColumnLayout::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Everything a pipeline run needs.
#[derive(Debug, Clone)]
pub struct Config {
    pub mail: MailConfig,
    pub sheet: SheetConfig,
    pub run: RunConfig,
}
