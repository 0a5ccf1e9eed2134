//! Envelope accumulation for one mail transaction

use crate::smtp::commands::{Address, MailFrom};

/// Accumulates one envelope: the sender, the accepted recipients and the
/// verbatim bytes of the envelope commands and the DATA payload.
///
/// A session replaces its transaction wholesale on RSET, EHLO and HELO.
#[derive(Debug, Default)]
pub struct Transaction {
    sender: Option<Address>,
    mail_parameters: Vec<String>,
    recipients: Vec<Address>,
    raw_header: Vec<u8>,
    raw_body: Vec<u8>,
    complete: bool,
}

impl Transaction {
    /// An empty transaction
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the MAIL command. Returns `false` if a sender is already set.
    pub fn set_sender(&mut self, mail: MailFrom, raw: &[u8]) -> bool {
        if self.sender.is_some() {
            return false;
        }

        self.sender = Some(mail.address);
        self.mail_parameters = mail.parameters;
        self.raw_header.extend_from_slice(raw);
        true
    }

    /// Record an accepted RCPT command
    pub fn add_recipient(&mut self, recipient: Address, raw: &[u8]) {
        self.recipients.push(recipient);
        self.raw_header.extend_from_slice(raw);
    }

    /// Append one DATA payload line, terminator included
    pub fn append_body(&mut self, raw: &[u8]) {
        self.raw_body.extend_from_slice(raw);
    }

    /// Flag the payload as fully received and accepted
    pub fn mark_complete(&mut self) {
        self.complete = true;
    }

    /// The reverse-path of the MAIL command
    pub fn sender(&self) -> Option<&Address> {
        self.sender.as_ref()
    }

    /// ESMTP parameters given with MAIL
    pub fn mail_parameters(&self) -> &[String] {
        &self.mail_parameters
    }

    /// Accepted recipients in RCPT order
    pub fn recipients(&self) -> &[Address] {
        &self.recipients
    }

    /// Number of accepted recipients
    pub fn recipient_count(&self) -> usize {
        self.recipients.len()
    }

    /// Verbatim MAIL and RCPT lines
    pub fn raw_header(&self) -> &[u8] {
        &self.raw_header
    }

    /// Verbatim DATA payload, terminator included
    pub fn raw_body(&self) -> &[u8] {
        &self.raw_body
    }

    /// Size of the DATA payload received so far
    pub fn body_size(&self) -> usize {
        self.raw_body.len()
    }

    /// Whether the DATA terminator was received and accepted
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// The message content: DATA payload without the terminator line, with
    /// leading-dot transparency (RFC 5321 4.5.2) undone.
    pub fn message(&self) -> Vec<u8> {
        let mut message = Vec::with_capacity(self.raw_body.len());

        for line in self.raw_body.split_inclusive(|b| *b == b'\n') {
            if is_terminator(line) {
                break;
            }
            match line.strip_prefix(b".") {
                Some(rest) => message.extend_from_slice(rest),
                None => message.extend_from_slice(line),
            }
        }

        message
    }
}

/// A lone "." line ends the DATA payload
pub fn is_terminator(line: &[u8]) -> bool {
    matches!(line, b"." | b".\n" | b".\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smtp::commands::{parse_mail_from, parse_rcpt_to};

    #[test]
    fn test_new_transaction() {
        let transaction = Transaction::new();
        assert!(transaction.sender().is_none());
        assert!(transaction.recipients().is_empty());
        assert!(transaction.raw_header().is_empty());
        assert!(transaction.raw_body().is_empty());
        assert!(!transaction.is_complete());
    }

    #[test]
    fn test_sender_set_once() {
        let mut transaction = Transaction::new();
        let first = parse_mail_from(" FROM:<a@x.com>").unwrap();
        let second = parse_mail_from(" FROM:<b@x.com>").unwrap();

        assert!(transaction.set_sender(first, b"MAIL FROM:<a@x.com>\r\n"));
        assert!(!transaction.set_sender(second, b"MAIL FROM:<b@x.com>\r\n"));
        assert_eq!(transaction.sender().unwrap().to_string(), "a@x.com");
        assert_eq!(transaction.raw_header(), b"MAIL FROM:<a@x.com>\r\n");
    }

    #[test]
    fn test_recipients_keep_order_and_duplicates() {
        let mut transaction = Transaction::new();
        for rcpt in ["c@x.com", "a@x.com", "c@x.com"] {
            let line = format!("RCPT TO:<{rcpt}>\r\n");
            transaction.add_recipient(parse_rcpt_to(&line[4..]).unwrap(), line.as_bytes());
        }

        let names: Vec<String> = transaction
            .recipients()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(names, vec!["c@x.com", "a@x.com", "c@x.com"]);
        assert_eq!(transaction.recipient_count(), 3);
    }

    #[test]
    fn test_message_strips_terminator_and_dot_stuffing() {
        let mut transaction = Transaction::new();
        transaction.append_body(b"Subject: Test\r\n");
        transaction.append_body(b"\r\n");
        transaction.append_body(b"..leading dot\r\n");
        transaction.append_body(b".\r\n");

        assert_eq!(transaction.body_size(), 35);
        assert_eq!(
            transaction.message(),
            b"Subject: Test\r\n\r\n.leading dot\r\n".to_vec()
        );
    }

    #[test]
    fn test_is_terminator() {
        assert!(is_terminator(b".\r\n"));
        assert!(is_terminator(b".\n"));
        assert!(!is_terminator(b"..\r\n"));
        assert!(!is_terminator(b". \r\n"));
    }
}
