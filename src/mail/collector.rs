//! Collects pass-request attachments from today's mail.

use chrono::NaiveDate;
use mail_parser::{MessageParser, MimeHeaders, PartType};
use tracing::{debug, info, warn};

use super::{ImapMailbox, Mailbox, SearchOutcome};
use crate::config::MailConfig;
use crate::error::MailError;
use crate::model::PassKind;
use crate::staging::StagingArea;

/// Outcome of one collection pass.
#[derive(Debug, Default)]
pub struct Collection {
    /// Accepted attachments, in the order they were found.
    pub staged: StagingArea,
    /// Messages fetched and marked read.
    pub processed: usize,
    search_failed: bool,
}

impl Collection {
    /// True only if the search succeeded and at least one attachment was accepted.
    pub fn succeeded(&self) -> bool {
        !self.search_failed && !self.staged.is_empty()
    }

    pub fn search_failed(&self) -> bool {
        self.search_failed
    }
}

/// Walks today's messages and stages attachments whose names carry a pass marker.
pub struct MailCollector<M: Mailbox> {
    mailbox: M,
}

impl<M: Mailbox> MailCollector<M> {
    pub fn new(mailbox: M) -> Self {
        Self { mailbox }
    }

    pub fn into_inner(self) -> M {
        self.mailbox
    }

    /// Process every message sent on or after `today`.
    ///
    /// Every fetched message is marked read, whether or not it had an
    /// accepted attachment. A message that cannot be parsed aborts the pass.
    pub fn collect(&mut self, today: NaiveDate) -> Result<Collection, MailError> {
        let mut collection = Collection::default();

        let seqs = match self.mailbox.search_sent_since(today)? {
            SearchOutcome::Found(seqs) => seqs,
            SearchOutcome::Failed(status) => {
                warn!(%status, "No messages found!");
                collection.search_failed = true;
                return Ok(collection);
            }
        };
        debug!(count = seqs.len(), "Search returned messages");
        if seqs.is_empty() {
            debug!("No suitable messages found");
        }

        for seq in seqs {
            let Some(raw) = self.mailbox.fetch(seq)? else {
                warn!("Failed to fetch email {seq}");
                continue;
            };
            debug!(seq, bytes = raw.len(), "Fetched message");

            for (filename, bytes) in accepted_attachments(seq, &raw)? {
                info!("Writing '{filename}' file...");
                collection.staged.stage(filename, bytes);
            }

            if let Err(e) = self.mailbox.mark_seen(seq) {
                warn!(seq, "Failed to mark message as read: {e}");
            }
            collection.processed += 1;
        }

        Ok(collection)
    }
}

/// Parse a raw message and return the attachments carrying a pass marker.
pub fn accepted_attachments(seq: u32, raw: &[u8]) -> Result<Vec<(String, Vec<u8>)>, MailError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or(MailError::MalformedMessage { seq })?;

    if !matches!(parsed.root_part().body, PartType::Multipart(_)) {
        debug!(seq, "Skip attachment: message is not multipart");
        return Ok(Vec::new());
    }

    let mut accepted = Vec::new();
    for part in parsed.attachments() {
        let Some(name) = part.attachment_name() else {
            debug!(seq, "Skip unnamed attachment");
            continue;
        };
        if PassKind::classify(name).is_none() {
            debug!("Skip '{name}' attachment");
            continue;
        }
        accepted.push((name.to_string(), part.contents().to_vec()));
    }
    Ok(accepted)
}

/// Connect to the configured server and run one collection pass.
///
/// Login and mailbox selection failures are returned as errors.
pub fn collect(config: &MailConfig, today: NaiveDate) -> Result<Collection, MailError> {
    let mut mailbox = ImapMailbox::connect(&config.server, config.port)?;
    mailbox.login(&config.username, &config.password)?;
    mailbox.select(&config.mailbox)?;
    info!(server = %config.server, mailbox = %config.mailbox, "Mailbox selected");

    let mut collector = MailCollector::new(mailbox);
    let collection = collector.collect(today)?;
    collector.into_inner().logout();

    info!(
        processed = collection.processed,
        staged = collection.staged.len(),
        "Mail collection finished"
    );
    Ok(collection)
}
