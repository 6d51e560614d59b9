//! Mailbox access and attachment collection.

pub mod collector;
pub mod imap;

use chrono::NaiveDate;

use crate::error::MailError;

pub use collector::{Collection, MailCollector, collect};
pub use imap::ImapMailbox;

/// Result of a date-bounded search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Sequence numbers of matching messages (possibly none).
    Found(Vec<u32>),
    /// The server rejected the search; carries its status text.
    Failed(String),
}

/// Blocking view of a selected mailbox.
///
/// Transport failures are `Err`; a server refusing a single FETCH is
/// `Ok(None)` so the caller can skip that message.
pub trait Mailbox {
    /// Messages sent on or after `date`.
    fn search_sent_since(&mut self, date: NaiveDate) -> Result<SearchOutcome, MailError>;

    /// Full raw body of message `seq`, without setting `\Seen`.
    fn fetch(&mut self, seq: u32) -> Result<Option<Vec<u8>>, MailError>;

    /// Set the `\Seen` flag on message `seq`.
    fn mark_seen(&mut self, seq: u32) -> Result<(), MailError>;
}
