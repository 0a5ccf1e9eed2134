//! Relay authorization policy

use crate::smtp::commands::Address;
use crate::smtp::config::SmtpConfig;
use crate::smtp::session::Mode;

/// Outcome of a relay check for one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayDecision {
    Accept,
    Reject(String),
}

impl RelayDecision {
    /// Whether the recipient may be accepted
    pub fn is_accept(&self) -> bool {
        matches!(self, RelayDecision::Accept)
    }
}

/// Decides which recipients a session may accept.
///
/// An authenticated client may address anyone; an unauthenticated one may
/// only address domains this server is responsible for. The relay-permitted
/// host list of the configuration is not consulted.
#[derive(Debug, Clone, Copy)]
pub struct RelayPolicy<'a> {
    config: &'a SmtpConfig,
}

impl<'a> RelayPolicy<'a> {
    /// Policy over the given configuration
    pub fn new(config: &'a SmtpConfig) -> Self {
        Self { config }
    }

    /// Accept when authenticated or the recipient domain is served
    pub fn decide(&self, authenticated: bool, recipient: &Address) -> RelayDecision {
        if authenticated || self.config.serves_domain(recipient.domain()) {
            RelayDecision::Accept
        } else {
            RelayDecision::Reject(format!("Unable to relay for {recipient}"))
        }
    }

    /// Informational mode for an accepted recipient
    pub fn classify(
        &self,
        authenticated: bool,
        sender: Option<&Address>,
        recipient: &Address,
    ) -> Mode {
        let local_sender = sender.is_some_and(|s| self.config.serves_domain(s.domain()));

        match (authenticated, local_sender) {
            (true, true) => Mode::Outbound,
            (true, false) => Mode::Relay,
            (false, _) if self.config.serves_domain(recipient.domain()) => Mode::Inbound,
            (false, _) => Mode::Unset,
        }
    }
}
