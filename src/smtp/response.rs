//! SMTP reply rendering

use crate::smtp::config::SmtpConfig;
use std::fmt;

/// A three digit reply code, optionally carrying the continuation marker
/// used on every line of a multiline reply but the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyCode {
    value: u16,
    continued: bool,
}

impl ReplyCode {
    /// A final reply code (`250 `)
    pub const fn new(value: u16) -> Self {
        Self {
            value,
            continued: false,
        }
    }

    /// A pre-marked continuation code (`250-`)
    pub const fn continued(value: u16) -> Self {
        Self {
            value,
            continued: true,
        }
    }

    /// The three digit code
    pub fn value(&self) -> u16 {
        self.value
    }

    /// Whether more lines of the same reply follow
    pub fn is_continued(&self) -> bool {
        self.continued
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.continued { '-' } else { ' ' };
        write!(f, "{}{}", self.value, marker)
    }
}

/// One reply line that can be sent to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// The reply code with its continuation marker
    pub code: ReplyCode,
    /// Enhanced status code (RFC 3463), e.g. "2.1.0"
    pub enhanced: Option<String>,
    /// The human-readable text
    pub text: String,
}

impl Reply {
    /// Create a final reply line
    pub fn new(code: u16, enhanced: Option<&str>, text: &str) -> Self {
        Self {
            code: ReplyCode::new(code),
            enhanced: enhanced.map(str::to_owned),
            text: text.to_owned(),
        }
    }

    /// Create a continuation line of a multiline reply
    pub fn continued(code: u16, text: &str) -> Self {
        Self {
            code: ReplyCode::continued(code),
            enhanced: None,
            text: text.to_owned(),
        }
    }

    /// 250 OK (2.1.0), used for accepted envelope commands
    pub fn ok() -> Self {
        Self::new(250, Some("2.1.0"), "OK")
    }

    /// 250 OK, used for the end of message data
    pub fn data_accepted() -> Self {
        Self::new(250, None, "OK")
    }

    /// 250 Flushed (2.1.5), the RSET reply
    pub fn flushed() -> Self {
        Self::new(250, Some("2.1.5"), "Flushed")
    }

    /// 354 Go ahead
    pub fn data_start() -> Self {
        Self::new(354, None, "Go ahead")
    }

    /// 221 closing connection (2.0.0)
    pub fn closing() -> Self {
        Self::new(221, Some("2.0.0"), "closing connection")
    }

    /// 220 service banner
    pub fn greeting(hostname: &str) -> Self {
        Self::new(220, None, &format!("{hostname} ESMTP service ready"))
    }

    /// The multiline EHLO/HELO reply advertising the configured extensions
    pub fn ehlo(config: &SmtpConfig, remote_address: &str) -> Vec<Self> {
        let mut lines = vec![
            Self::continued(
                250,
                &format!("{} at your service, {remote_address}", config.hostname()),
            ),
            Self::continued(250, &format!("SIZE {}", config.max_message_size())),
            Self::continued(250, "8BITMIME"),
            Self::continued(250, "ENHANCEDSTATUSCODES"),
        ];

        if !config.auth_mechanisms().is_empty() {
            lines.push(Self::continued(
                250,
                &format!("AUTH {}", config.auth_mechanisms().join(" ")),
            ));
        }

        lines.push(Self::new(250, None, "CHUNKING"));
        lines
    }

    /// Format the reply for the wire.
    ///
    /// When `session_id` is given it is appended to the text as
    /// `" - <session-id>"`.
    pub fn render(&self, session_id: Option<&str>) -> String {
        let mut line = self.code.to_string();

        if !self.code.is_continued() {
            if let Some(ref enhanced) = self.enhanced {
                line.push_str(enhanced);
                line.push(' ');
            }
        }

        line.push_str(&self.text);

        if let Some(id) = session_id {
            line.push_str(" - ");
            line.push_str(id);
        }

        line.push_str("\r\n");
        line
    }

    /// Check if this is a success reply (2xx or 3xx)
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.code.value())
    }

    /// Check if this is an error reply (4xx or 5xx)
    pub fn is_error(&self) -> bool {
        self.code.value() >= 400
    }
}
