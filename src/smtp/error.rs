//! Error types for the SMTP front end

use crate::smtp::response::Reply;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid command")]
    InvalidCommand,

    #[error("Bad sequence of commands: {0}")]
    BadSequence(&'static str),

    #[error("Invalid syntax: {0}")]
    InvalidSyntax(String),

    #[error("Unable to relay for {0}")]
    RelayDenied(String),

    #[error("Too many recipients (max {max})")]
    TooManyRecipients { max: usize },

    #[error("Message size exceeds fixed maximum message size (max {max} bytes)")]
    MessageTooLarge { max: usize },

    #[error("Too many errors")]
    TooManyErrors,

    #[error("Path too long (max {max} characters)")]
    PathTooLong { max: usize },

    #[error("Domain name too long (max {max} characters)")]
    DomainTooLong { max: usize },

    #[error("User name too long (max {max} characters)")]
    UserTooLong { max: usize },

    #[error("Connection closed")]
    ConnectionClosed,
}

/// SMTP size limits and configuration defaults
pub struct SmtpLimits;

impl SmtpLimits {
    /// Maximum length of the local part of a mailbox (RFC 5321 4.5.3.1.1)
    pub const USER_MAX_LENGTH: usize = 64;

    /// Maximum length of a domain name (RFC 5321 4.5.3.1.2)
    pub const DOMAIN_MAX_LENGTH: usize = 255;

    /// Maximum length of a path, angle brackets excluded
    pub const PATH_MAX_LENGTH: usize = 256;

    /// Default maximum number of recipients per transaction
    pub const MAX_RECIPIENTS: usize = 100;

    /// Default number of rejected commands tolerated per session
    pub const MAX_ERRORS: usize = 20;

    /// Default maximum message size advertised through SIZE
    pub const MAX_MESSAGE_SIZE: usize = 35_882_577;
}

impl SmtpError {
    /// Maps an error onto the reply sent to the client
    pub fn to_reply(&self) -> Reply {
        match self {
            SmtpError::Io(_) | SmtpError::ConnectionClosed => {
                Reply::new(421, Some("4.3.0"), "Service not available")
            }
            SmtpError::InvalidCommand => Reply::new(500, Some("5.5.1"), "Invalid command"),
            SmtpError::BadSequence(msg) => Reply::new(503, Some("5.5.1"), msg),
            SmtpError::InvalidSyntax(_)
            | SmtpError::PathTooLong { .. }
            | SmtpError::DomainTooLong { .. }
            | SmtpError::UserTooLong { .. } => Reply::new(503, Some("5.5.2"), "Syntax error"),
            SmtpError::RelayDenied(addr) => Reply::new(
                550,
                Some("5.7.1"),
                &format!("Unable to relay for {addr}"),
            ),
            SmtpError::TooManyRecipients { .. } => {
                Reply::new(552, Some("5.5.3"), "Too many recipients")
            }
            SmtpError::MessageTooLarge { .. } => Reply::new(
                552,
                Some("5.3.4"),
                "Message size exceeds fixed maximum message size",
            ),
            SmtpError::TooManyErrors => Reply::new(421, Some("4.5.2"), "Too many errors"),
        }
    }

    /// Whether the error ends the session
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SmtpError::TooManyErrors | SmtpError::Io(_) | SmtpError::ConnectionClosed
        )
    }
}
