//! Completed messages handed to collaborators

use crate::smtp::transaction::Transaction;
use std::time::SystemTime;

/// A message whose DATA phase completed successfully
#[derive(Debug, Clone)]
pub struct Email {
    /// Session the message was received on
    pub session_id: String,

    /// The envelope sender
    pub from: String,

    /// Accepted envelope recipients, in RCPT order
    pub to: Vec<String>,

    /// The message content, headers and body, terminator removed
    pub data: String,

    /// When the message was completed
    pub timestamp: SystemTime,
}

impl Email {
    /// Build an email from a completed transaction
    pub fn from_transaction(session_id: &str, transaction: &Transaction) -> Option<Self> {
        if !transaction.is_complete() {
            return None;
        }

        let from = transaction.sender()?.to_string();
        let to = transaction
            .recipients()
            .iter()
            .map(ToString::to_string)
            .collect();

        Some(Self {
            session_id: session_id.to_owned(),
            from,
            to,
            data: String::from_utf8_lossy(&transaction.message()).into_owned(),
            timestamp: SystemTime::now(),
        })
    }

    /// Check if this email was sent to a specific recipient
    pub fn has_recipient(&self, recipient: &str) -> bool {
        self.to.iter().any(|addr| addr == recipient)
    }

    /// Get the size of the email data in bytes
    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Get the subject line from the email headers (if present)
    pub fn subject(&self) -> Option<&str> {
        self.data
            .lines()
            .take_while(|line| !line.is_empty())
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("subject").then(|| value.trim())
            })
    }
}
