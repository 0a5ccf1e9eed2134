//! # Mailgate
//!
//! Mailgate is the protocol front end of an SMTP server.
//!
//! A transport hands each received line to an [`SmtpSession`], which
//! validates command order, accumulates the envelope and the message data in
//! a [`Transaction`], applies the relay policy to every recipient and writes
//! the replies back through the [`Transport`].
//!
//! ## Quick Start
//!
//! ```rust
//! use mailgate::{BufferTransport, SmtpConfig, SmtpSession, SmtpState};
//! use std::sync::Arc;
//!
//! let config = SmtpConfig::new("mx.example.com").with_served_domains(["example.com"]);
//! let mut session = SmtpSession::new(Arc::new(config), BufferTransport::new("192.0.2.1"));
//!
//! session.feed(b"EHLO client.example.org\r\n");
//! session.feed(b"MAIL FROM:<alice@example.org>\r\n");
//! session.feed(b"RCPT TO:<bob@example.com>\r\n");
//! assert_eq!(session.state(), SmtpState::Rcpt);
//!
//! session.feed(b"RCPT TO:<carol@elsewhere.net>\r\n");
//! assert!(session.transport().output().contains("550 5.7.1 Unable to relay for carol@elsewhere.net"));
//! ```
//!
//! ## Supported SMTP commands
//!
//! - `EHLO` / `HELO` - Identify the client and reset the session
//! - `MAIL FROM` - Specify the sender's address
//! - `RCPT TO` - Specify a recipient (multiple recipients are supported)
//! - `DATA` - Send the message content
//! - `RSET` - Reset the current transaction
//! - `QUIT` - Close connection
//!
//! Any other command is answered with `500`.
//!
//! ## Relay policy
//!
//! Recipients are accepted when the session carries an authenticated
//! identity (see [`SmtpSession::set_auth_identity`]) or when their domain is
//! one of the configured served domains. Everything else is rejected with
//! `550 5.7.1`.
//!
//! ## Error budget
//!
//! Every rejected command counts against the session. Once the configured
//! maximum is reached the next line is answered with `421 4.5.2` and the
//! connection is closed.
//!
//! ## Hooks
//!
//! A collaborator can register a [`SessionHook`] that sees the session and
//! the staged default replies after every line. Returning
//! [`HookAction::Suppress`], or calling [`SmtpSession::respond`] from the
//! hook, replaces the default replies.
//!
//! ## Notes
//!
//! - Authentication mechanisms and TLS are not implemented; they are only
//!   advertised as configured.
//! - Completed messages are not stored or delivered. [`SmtpServer`] forwards
//!   them to a channel.

mod smtp;

pub use smtp::{
    Address, AuditEntry, AuditLog, BufferTransport, Command, Direction, Email, HookAction,
    MailFrom, Mode, RelayDecision, RelayPolicy, Reply, ReplyCode, SessionHook, SmtpConfig,
    SmtpError, SmtpLimits, SmtpServer, SmtpSession, SmtpState, TcpTransport, Transaction,
    Transport,
};
