//! Process-wide, read-only server configuration

use crate::smtp::error::SmtpLimits;
use serde::Deserialize;
use std::collections::HashSet;

/// Configuration shared by every session.
///
/// Built once, then handed to sessions behind an `Arc`. Domain and host
/// names are stored lower-cased.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SmtpConfig {
    hostname: String,
    max_message_size: usize,
    auth_mechanisms: Vec<String>,
    max_recipients: usize,
    max_errors: usize,
    #[serde(deserialize_with = "lowercase_set")]
    served_domains: HashSet<String>,
    #[serde(deserialize_with = "lowercase_set")]
    relay_permitted_hosts: HashSet<String>,
}

fn lowercase_set<'de, D>(deserializer: D) -> Result<HashSet<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let names = Vec::<String>::deserialize(deserializer)?;
    Ok(names.iter().map(|n| n.to_ascii_lowercase()).collect())
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            hostname: "mailgate.local".to_owned(),
            max_message_size: SmtpLimits::MAX_MESSAGE_SIZE,
            auth_mechanisms: vec!["PLAIN".to_owned()],
            max_recipients: SmtpLimits::MAX_RECIPIENTS,
            max_errors: SmtpLimits::MAX_ERRORS,
            served_domains: HashSet::new(),
            relay_permitted_hosts: HashSet::new(),
        }
    }
}

impl SmtpConfig {
    /// Create a configuration with defaults for everything but the hostname
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_owned(),
            ..Self::default()
        }
    }

    /// Largest message accepted, advertised through SIZE
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// AUTH mechanisms to advertise; an empty list hides AUTH
    pub fn with_auth_mechanisms<I, S>(mut self, mechanisms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auth_mechanisms = mechanisms.into_iter().map(Into::into).collect();
        self
    }

    /// Recipients accepted per transaction
    pub fn with_max_recipients(mut self, max: usize) -> Self {
        self.max_recipients = max;
        self
    }

    /// Rejected commands tolerated before the session is closed
    pub fn with_max_errors(mut self, max: usize) -> Self {
        self.max_errors = max;
        self
    }

    /// Domains this server accepts mail for without authentication
    pub fn with_served_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.served_domains = domains
            .into_iter()
            .map(|d| d.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    /// Hosts allowed to relay without authentication.
    ///
    /// Carried for collaborators; the relay policy does not consult it.
    pub fn with_relay_permitted_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.relay_permitted_hosts = hosts
            .into_iter()
            .map(|h| h.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    /// Name used in the greeting and the EHLO reply
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Largest accepted message in bytes
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Advertised AUTH mechanisms
    pub fn auth_mechanisms(&self) -> &[String] {
        &self.auth_mechanisms
    }

    /// Recipient limit per transaction
    pub fn max_recipients(&self) -> usize {
        self.max_recipients
    }

    /// Error budget per session
    pub fn max_errors(&self) -> usize {
        self.max_errors
    }

    /// Locally served domains, lower-cased
    pub fn served_domains(&self) -> &HashSet<String> {
        &self.served_domains
    }

    /// Hosts exempt from relay checks, lower-cased
    pub fn relay_permitted_hosts(&self) -> &HashSet<String> {
        &self.relay_permitted_hosts
    }

    /// Case-insensitive membership in the served domain set
    pub fn serves_domain(&self, domain: &str) -> bool {
        self.served_domains.contains(&domain.to_ascii_lowercase())
    }
}
