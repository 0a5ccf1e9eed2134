//! Per-connection SMTP protocol state machine

use crate::smtp::commands::{Command, parse_mail_from, parse_rcpt_to, split_token};
use crate::smtp::config::SmtpConfig;
use crate::smtp::error::SmtpError;
use crate::smtp::relay::{RelayDecision, RelayPolicy};
use crate::smtp::response::Reply;
use crate::smtp::transaction::{Transaction, is_terminator};
use crate::smtp::transport::Transport;

use log::{debug, trace, warn};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Protocol state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmtpState {
    /// Nothing negotiated yet, or reset by RSET
    Unset,
    /// EHLO/HELO accepted - ready for MAIL
    Ehlo,
    /// MAIL accepted - ready for RCPT
    Mail,
    /// At least one RCPT accepted - ready for DATA or more RCPT
    Rcpt,
    /// DATA accepted - waiting for the first payload line
    Data,
    /// Receiving payload lines
    DataIncoming,
    /// Terminator received
    DataEnd,
    /// QUIT received
    Quit,
}

impl SmtpState {
    /// The state a command leads to when it is accepted
    pub fn reached_by(command: Command) -> Self {
        match command {
            Command::Ehlo | Command::Helo => SmtpState::Ehlo,
            Command::Mail => SmtpState::Mail,
            Command::Rcpt => SmtpState::Rcpt,
            Command::Data => SmtpState::Data,
            Command::Rset => SmtpState::Unset,
            Command::Quit => SmtpState::Quit,
            Command::DataIncoming => SmtpState::DataIncoming,
            Command::DataEnd => SmtpState::DataEnd,
        }
    }

    /// Whether a line carrying `command` is message data in this state.
    ///
    /// Once payload is flowing every line is data. Right after DATA the
    /// envelope commands are still interpreted, QUIT and anything
    /// unrecognised become the first payload line.
    pub fn takes_as_payload(&self, command: Option<Command>) -> bool {
        match self {
            SmtpState::DataIncoming => true,
            SmtpState::Data => !matches!(
                command,
                Some(
                    Command::Rset
                        | Command::Ehlo
                        | Command::Helo
                        | Command::Mail
                        | Command::Rcpt
                        | Command::Data
                )
            ),
            _ => false,
        }
    }
}

/// What the connection is being used for. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Unset,
    /// Delivery to a locally served domain
    Inbound,
    /// An authenticated local user sending mail
    Outbound,
    /// An authenticated client relaying for a foreign sender
    Relay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Received,
    Sent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub direction: Direction,
    pub bytes: Vec<u8>,
}

/// Append-only record of everything received and sent on a session
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    fn push(&mut self, direction: Direction, bytes: &[u8]) {
        self.entries.push(AuditEntry {
            direction,
            bytes: bytes.to_vec(),
        });
    }

    /// Entries in the order they happened
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Concatenated bytes of every entry in one direction
    pub fn bytes(&self, direction: Direction) -> Vec<u8> {
        self.entries
            .iter()
            .filter(|e| e.direction == direction)
            .flat_map(|e| e.bytes.iter().copied())
            .collect()
    }
}

/// Returned by a hook to decide whether the staged default replies are sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    Proceed,
    Suppress,
}

/// Called once per `feed` with the session and its staged default replies
pub type SessionHook<T> = Box<dyn FnMut(&mut SmtpSession<T>, &[Reply]) -> HookAction + Send>;

/// One SMTP session: protocol state, the current transaction and the
/// connection it replies on.
pub struct SmtpSession<T: Transport> {
    id: String,
    config: Arc<SmtpConfig>,
    transport: T,
    state: SmtpState,
    command: Option<Command>,
    auth_identity: Option<String>,
    mode: Mode,
    error_count: usize,
    transaction: Transaction,
    client_domain: Option<String>,
    audit: AuditLog,
    pending: Option<Vec<Reply>>,
    hook: Option<SessionHook<T>>,
}

impl<T: Transport> SmtpSession<T> {
    /// Create a session for a freshly accepted connection
    pub fn new(config: Arc<SmtpConfig>, transport: T) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        debug!("session {id} opened for {}", transport.remote_address());

        Self {
            id,
            config,
            transport,
            state: SmtpState::Unset,
            command: None,
            auth_identity: None,
            mode: Mode::Unset,
            error_count: 0,
            transaction: Transaction::new(),
            client_domain: None,
            audit: AuditLog::default(),
            pending: None,
            hook: None,
        }
    }

    /// Send the 220 service banner
    pub fn greet(&mut self) -> Result<usize, SmtpError> {
        let banner = Reply::greeting(self.config.hostname()).render(None);
        self.write_line(banner)
    }

    /// Consume one command line or one line of message data
    pub fn feed(&mut self, chunk: &[u8]) {
        if !self.transport.is_open() {
            debug!("session {} closed, discarding {} bytes", self.id, chunk.len());
            return;
        }

        self.audit.push(Direction::Received, chunk);
        trace!("{} > {}", self.id, String::from_utf8_lossy(chunk).trim_end());

        if self.error_count >= self.config.max_errors() {
            warn!(
                "session {} exceeded {} errors, closing",
                self.id,
                self.config.max_errors()
            );
            self.command = None;
            if let Err(e) = self.respond(&SmtpError::TooManyErrors.to_reply()) {
                debug!("session {}: {e}", self.id);
            }
            self.transport.close();
            return;
        }

        let replies = match self.dispatch(chunk) {
            Ok(replies) => replies,
            Err(e) => {
                self.error_count += 1;
                debug!(
                    "session {} rejected {:?} ({e}), {} errors",
                    self.id, self.command, self.error_count
                );
                vec![e.to_reply()]
            }
        };

        self.pending = Some(replies.clone());

        if let Some(mut hook) = self.hook.take() {
            if hook(self, &replies) == HookAction::Suppress {
                self.pending = None;
            }
            if self.hook.is_none() {
                self.hook = Some(hook);
            }
        }

        if let Some(replies) = self.pending.take() {
            for reply in &replies {
                if let Err(e) = self.respond(reply) {
                    warn!("session {}: failed to send reply: {e}", self.id);
                    if e.is_fatal() {
                        self.transport.close();
                    }
                    break;
                }
            }
        }

        if self.command == Some(Command::Quit) && self.transport.is_open() {
            self.transport.close();
        }
    }

    /// Render and send one reply.
    ///
    /// Clears any staged default replies, so a hook calling this replaces
    /// the automatic response for the current chunk.
    pub fn respond(&mut self, reply: &Reply) -> Result<usize, SmtpError> {
        self.pending = None;

        let suffix = (self.state != SmtpState::Ehlo).then_some(self.id.as_str());
        let line = reply.render(suffix);
        self.write_line(line)
    }

    /// Forget the current transaction and return to the unset state.
    ///
    /// The error count, session id and authenticated identity survive.
    pub fn reset(&mut self) {
        self.state = SmtpState::Unset;
        self.mode = Mode::Unset;
        self.transaction = Transaction::new();
    }

    fn write_line(&mut self, line: String) -> Result<usize, SmtpError> {
        self.audit.push(Direction::Sent, line.as_bytes());
        trace!("{} < {}", self.id, line.trim_end());

        self.transport.write(line.as_bytes())?;
        Ok(line.len())
    }

    fn dispatch(&mut self, chunk: &[u8]) -> Result<Vec<Reply>, SmtpError> {
        self.command = None;

        if self.state == SmtpState::DataIncoming {
            return self.handle_data_line(chunk);
        }

        let line = String::from_utf8_lossy(chunk);
        let (token, args) = split_token(&line);
        let command = Command::from_token(&token);

        if self.state.takes_as_payload(command) {
            return self.handle_data_line(chunk);
        }

        match command {
            Some(Command::Rset) => {
                self.command = Some(Command::Rset);
                self.reset();
                Ok(vec![Reply::flushed()])
            }
            Some(cmd @ (Command::Ehlo | Command::Helo)) => self.handle_ehlo(cmd, args),
            Some(Command::Mail) => self.handle_mail(args, chunk),
            Some(Command::Rcpt) => self.handle_rcpt(args, chunk),
            Some(Command::Data) => self.handle_data(),
            Some(Command::Quit) => {
                self.command = Some(Command::Quit);
                self.state = SmtpState::Quit;
                Ok(vec![Reply::closing()])
            }
            _ => Err(SmtpError::InvalidCommand),
        }
    }

    fn handle_ehlo(&mut self, cmd: Command, args: &str) -> Result<Vec<Reply>, SmtpError> {
        self.command = Some(cmd);
        self.reset();
        self.state = SmtpState::Ehlo;

        let domain = args.trim();
        if !domain.is_empty() {
            self.client_domain = Some(domain.to_owned());
        }

        Ok(Reply::ehlo(&self.config, &self.transport.remote_address()))
    }

    fn handle_mail(&mut self, args: &str, raw: &[u8]) -> Result<Vec<Reply>, SmtpError> {
        self.command = Some(Command::Mail);

        match self.state {
            SmtpState::Ehlo => {}
            SmtpState::Unset => return Err(SmtpError::BadSequence("EHLO/HELO first")),
            _ => return Err(SmtpError::BadSequence("Invalid command")),
        }

        let mail = parse_mail_from(args)?;

        let max = self.config.max_message_size();
        if mail.declared_size().is_some_and(|size| size > max) {
            return Err(SmtpError::MessageTooLarge { max });
        }

        self.transaction.set_sender(mail, raw);
        self.state = SmtpState::Mail;
        Ok(vec![Reply::ok()])
    }

    fn handle_rcpt(&mut self, args: &str, raw: &[u8]) -> Result<Vec<Reply>, SmtpError> {
        self.command = Some(Command::Rcpt);

        if !matches!(self.state, SmtpState::Mail | SmtpState::Rcpt) {
            return Err(SmtpError::BadSequence("Mail first"));
        }

        let recipient = parse_rcpt_to(args)?;

        let max = self.config.max_recipients();
        if self.transaction.recipient_count() >= max {
            return Err(SmtpError::TooManyRecipients { max });
        }

        let policy = RelayPolicy::new(&self.config);
        let authenticated = self.auth_identity.is_some();

        match policy.decide(authenticated, &recipient) {
            RelayDecision::Accept => {
                self.mode = policy.classify(authenticated, self.transaction.sender(), &recipient);
                self.transaction.add_recipient(recipient, raw);
                self.state = SmtpState::Rcpt;
                Ok(vec![Reply::ok()])
            }
            RelayDecision::Reject(reason) => {
                debug!("session {}: {reason}", self.id);
                Err(SmtpError::RelayDenied(recipient.to_string()))
            }
        }
    }

    fn handle_data(&mut self) -> Result<Vec<Reply>, SmtpError> {
        self.command = Some(Command::Data);

        match self.state {
            SmtpState::Rcpt => {
                self.state = SmtpState::Data;
                Ok(vec![Reply::data_start()])
            }
            SmtpState::Unset => Err(SmtpError::BadSequence("EHLO/HELO first")),
            _ => Err(SmtpError::BadSequence("Invalid command")),
        }
    }

    fn handle_data_line(&mut self, chunk: &[u8]) -> Result<Vec<Reply>, SmtpError> {
        self.transaction.append_body(chunk);

        // The first line after DATA is always payload
        if self.state == SmtpState::Data || !is_terminator(chunk) {
            self.command = Some(Command::DataIncoming);
            self.state = SmtpState::DataIncoming;
            return Ok(Vec::new());
        }

        self.command = Some(Command::DataEnd);
        self.state = SmtpState::DataEnd;

        let max = self.config.max_message_size();
        if self.transaction.body_size() - chunk.len() > max {
            return Err(SmtpError::MessageTooLarge { max });
        }

        self.transaction.mark_complete();
        debug!(
            "session {} received {} bytes for {} recipients",
            self.id,
            self.transaction.body_size(),
            self.transaction.recipient_count()
        );
        Ok(vec![Reply::data_accepted()])
    }

    /// Register the per-chunk hook, replacing any previous one
    pub fn set_hook<F>(&mut self, hook: F)
    where
        F: FnMut(&mut SmtpSession<T>, &[Reply]) -> HookAction + Send + 'static,
    {
        self.hook = Some(Box::new(hook));
    }

    /// Remove the registered hook
    pub fn clear_hook(&mut self) {
        self.hook = None;
    }

    /// Unique id of this session, 32 hex digits
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current protocol state
    pub fn state(&self) -> SmtpState {
        self.state
    }

    /// Command recognised in the most recent `feed`
    pub fn command(&self) -> Option<Command> {
        self.command
    }

    /// A command is valid when it moved the session into its own state
    pub fn is_valid_command(&self) -> bool {
        self.command
            .is_some_and(|cmd| SmtpState::reached_by(cmd) == self.state)
    }

    /// Identity set by an authentication collaborator
    pub fn auth_identity(&self) -> Option<&str> {
        self.auth_identity.as_deref()
    }

    /// Set by an authentication collaborator once credentials check out
    pub fn set_auth_identity(&mut self, identity: Option<String>) {
        self.auth_identity = identity;
    }

    /// What the connection is being used for
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Override the classified mode
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Rejected commands so far; survives RSET and EHLO
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// The transaction being accumulated
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Domain given with the latest EHLO/HELO
    pub fn client_domain(&self) -> Option<&str> {
        self.client_domain.as_deref()
    }

    /// Everything received and sent on this session
    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Configuration the session was created with
    pub fn config(&self) -> &SmtpConfig {
        &self.config
    }

    /// The connection replies are written to
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the connection
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Whether the connection has been closed
    pub fn is_closed(&self) -> bool {
        !self.transport.is_open()
    }
}

impl<T: Transport> fmt::Debug for SmtpSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("command", &self.command)
            .field("mode", &self.mode)
            .field("error_count", &self.error_count)
            .field("transaction", &self.transaction)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smtp::transport::BufferTransport;

    fn create_session() -> SmtpSession<BufferTransport> {
        let config = SmtpConfig::new("test.local").with_served_domains(["example.com"]);
        SmtpSession::new(Arc::new(config), BufferTransport::new("192.0.2.7"))
    }

    #[test]
    fn test_new_session() {
        let session = create_session();
        assert_eq!(session.state(), SmtpState::Unset);
        assert_eq!(session.mode(), Mode::Unset);
        assert_eq!(session.error_count(), 0);
        assert_eq!(session.id().len(), 32);
        assert!(session.command().is_none());
        assert!(!session.is_valid_command());
        assert!(session.auth_identity().is_none());
        assert!(session.audit_log().is_empty());
    }

    #[test]
    fn test_payload_lines_per_state() {
        assert!(SmtpState::DataIncoming.takes_as_payload(Some(Command::Rset)));
        assert!(SmtpState::DataIncoming.takes_as_payload(None));

        assert!(SmtpState::Data.takes_as_payload(Some(Command::Quit)));
        assert!(SmtpState::Data.takes_as_payload(None));
        for cmd in [Command::Rset, Command::Ehlo, Command::Helo, Command::Mail] {
            assert!(!SmtpState::Data.takes_as_payload(Some(cmd)), "{cmd}");
        }

        assert!(!SmtpState::Rcpt.takes_as_payload(None));
        assert!(!SmtpState::DataEnd.takes_as_payload(Some(Command::Quit)));
    }

    #[test]
    fn test_greeting_has_no_suffix() {
        let mut session = create_session();
        session.greet().unwrap();
        assert_eq!(
            session.transport_mut().take_output(),
            "220 test.local ESMTP service ready\r\n"
        );
    }

    #[test]
    fn test_ehlo_remembers_client_domain() {
        let mut session = create_session();
        session.feed(b"EHLO client.local\r\n");

        assert_eq!(session.state(), SmtpState::Ehlo);
        assert_eq!(session.command(), Some(Command::Ehlo));
        assert!(session.is_valid_command());
        assert_eq!(session.client_domain(), Some("client.local"));

        let output = session.transport_mut().take_output();
        assert!(output.starts_with("250-test.local at your service, 192.0.2.7\r\n"));
    }

    #[test]
    fn test_helo_is_valid_in_ehlo_state() {
        let mut session = create_session();
        session.feed(b"HELO client.local\r\n");

        assert_eq!(session.state(), SmtpState::Ehlo);
        assert_eq!(session.command(), Some(Command::Helo));
        assert!(session.is_valid_command());
    }

    #[test]
    fn test_failed_command_is_not_valid() {
        let mut session = create_session();
        session.feed(b"MAIL FROM:<a@example.com>\r\n");

        assert_eq!(session.command(), Some(Command::Mail));
        assert_eq!(session.state(), SmtpState::Unset);
        assert!(!session.is_valid_command());
        assert_eq!(session.error_count(), 1);
    }

    #[test]
    fn test_reset_keeps_identity_and_errors() {
        let mut session = create_session();
        session.set_auth_identity(Some("user-1".to_string()));
        session.feed(b"BOGUS\r\n");
        session.feed(b"EHLO client.local\r\n");
        session.feed(b"MAIL FROM:<a@example.com>\r\n");
        session.set_mode(Mode::Outbound);

        session.reset();

        assert_eq!(session.state(), SmtpState::Unset);
        assert_eq!(session.mode(), Mode::Unset);
        assert!(session.transaction().sender().is_none());
        assert_eq!(session.auth_identity(), Some("user-1"));
        assert_eq!(session.error_count(), 1);
    }

    #[test]
    fn test_declared_size_over_limit() {
        let config = SmtpConfig::new("test.local").with_max_message_size(100);
        let mut session = SmtpSession::new(Arc::new(config), BufferTransport::default());
        session.feed(b"EHLO client.local\r\n");
        session.transport_mut().take_output();

        session.feed(b"MAIL FROM:<a@example.com> SIZE=101\r\n");

        assert_eq!(session.state(), SmtpState::Ehlo);
        assert_eq!(
            session.transport_mut().take_output(),
            "552 5.3.4 Message size exceeds fixed maximum message size\r\n"
        );
    }

    #[test]
    fn test_oversized_data_is_not_completed() {
        let config = SmtpConfig::new("test.local")
            .with_max_message_size(10)
            .with_served_domains(["example.com"]);
        let mut session = SmtpSession::new(Arc::new(config), BufferTransport::default());
        for line in [
            "EHLO client.local\r\n",
            "MAIL FROM:<a@example.com>\r\n",
            "RCPT TO:<b@example.com>\r\n",
            "DATA\r\n",
            "This line is longer than ten bytes\r\n",
        ] {
            session.feed(line.as_bytes());
        }
        session.transport_mut().take_output();

        session.feed(b".\r\n");

        assert_eq!(session.state(), SmtpState::DataEnd);
        assert!(!session.transaction().is_complete());
        assert_eq!(session.error_count(), 1);
        assert!(session.transport().output().starts_with("552 5.3.4 "));
    }

    #[test]
    fn test_classifies_mode_on_accepted_recipient() {
        let mut session = create_session();
        session.feed(b"EHLO client.local\r\n");
        session.feed(b"MAIL FROM:<a@remote.org>\r\n");
        session.feed(b"RCPT TO:<b@example.com>\r\n");

        assert_eq!(session.mode(), Mode::Inbound);

        session.set_auth_identity(Some("relay-user".to_string()));
        session.feed(b"RCPT TO:<c@elsewhere.net>\r\n");
        assert_eq!(session.mode(), Mode::Relay);
    }

    #[test]
    fn test_feed_after_close_is_discarded() {
        let mut session = create_session();
        session.feed(b"QUIT\r\n");
        assert!(session.is_closed());
        let entries = session.audit_log().len();

        session.feed(b"EHLO client.local\r\n");

        assert_eq!(session.state(), SmtpState::Quit);
        assert_eq!(session.audit_log().len(), entries);
    }
}
