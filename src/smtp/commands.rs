//! SMTP command tokens and envelope argument parsing

use crate::smtp::error::{SmtpError, SmtpLimits};
use std::fmt;

/// Commands recognised by a session.
///
/// `DataIncoming` and `DataEnd` are synthetic: they are recorded for payload
/// lines and for the end-of-data terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Ehlo,
    Helo,
    Mail,
    Rcpt,
    Data,
    Rset,
    Quit,
    DataIncoming,
    DataEnd,
}

impl Command {
    /// Map a case-folded command token onto a wire command
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "EHLO" => Some(Command::Ehlo),
            "HELO" => Some(Command::Helo),
            "MAIL" => Some(Command::Mail),
            "RCPT" => Some(Command::Rcpt),
            "DATA" => Some(Command::Data),
            "RSET" => Some(Command::Rset),
            "QUIT" => Some(Command::Quit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Ehlo => "EHLO",
            Command::Helo => "HELO",
            Command::Mail => "MAIL",
            Command::Rcpt => "RCPT",
            Command::Data => "DATA",
            Command::Rset => "RSET",
            Command::Quit => "QUIT",
            Command::DataIncoming => "DATA-INCOMING",
            Command::DataEnd => "DATA-END",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split a line into its leading command token (upper-cased run of ASCII
/// word characters) and the remainder of the line.
pub fn split_token(line: &str) -> (String, &str) {
    let end = line
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(line.len());

    (line[..end].to_uppercase(), &line[end..])
}

/// Strip the line terminator from a received chunk
pub fn trim_line_ending(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

/// A mailbox address from a MAIL or RCPT path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    local_part: String,
    domain: String,
}

impl Address {
    /// Parse and validate `local@domain`
    pub fn parse(addr: &str) -> Result<Self, SmtpError> {
        if addr.len() > SmtpLimits::PATH_MAX_LENGTH {
            return Err(SmtpError::PathTooLong {
                max: SmtpLimits::PATH_MAX_LENGTH,
            });
        }

        if addr.chars().any(|c| c.is_whitespace() || c == '<' || c == '>') {
            return Err(SmtpError::InvalidSyntax(
                "Address contains forbidden characters".to_string(),
            ));
        }

        let Some(at_pos) = addr.rfind('@') else {
            return Err(SmtpError::InvalidSyntax(
                "Email address must contain @ symbol".to_string(),
            ));
        };

        let user_part = &addr[..at_pos];
        let domain_part = &addr[at_pos + 1..];

        if user_part.len() > SmtpLimits::USER_MAX_LENGTH {
            return Err(SmtpError::UserTooLong {
                max: SmtpLimits::USER_MAX_LENGTH,
            });
        }

        if domain_part.len() > SmtpLimits::DOMAIN_MAX_LENGTH {
            return Err(SmtpError::DomainTooLong {
                max: SmtpLimits::DOMAIN_MAX_LENGTH,
            });
        }

        if user_part.is_empty() || domain_part.is_empty() {
            return Err(SmtpError::InvalidSyntax(
                "Invalid email address format".to_string(),
            ));
        }

        Ok(Self {
            local_part: user_part.to_owned(),
            domain: domain_part.to_owned(),
        })
    }

    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

/// Arguments of `MAIL FROM:<reverse-path> [SP <mail-parameters>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailFrom {
    pub address: Address,
    pub parameters: Vec<String>,
}

impl MailFrom {
    /// Size declared with the SIZE extension parameter, if any
    pub fn declared_size(&self) -> Option<usize> {
        self.parameters.iter().find_map(|p| {
            let (key, value) = p.split_once('=')?;
            if key.eq_ignore_ascii_case("SIZE") {
                value.parse().ok()
            } else {
                None
            }
        })
    }
}

/// Parse the argument part of a MAIL command (the text after the token)
pub fn parse_mail_from(args: &str) -> Result<MailFrom, SmtpError> {
    let (address, parameters) = parse_path(args, "FROM:")?;
    Ok(MailFrom {
        address,
        parameters,
    })
}

/// Parse the argument part of a RCPT command (the text after the token)
pub fn parse_rcpt_to(args: &str) -> Result<Address, SmtpError> {
    let (address, _) = parse_path(args, "TO:")?;
    Ok(address)
}

fn parse_path(args: &str, keyword: &str) -> Result<(Address, Vec<String>), SmtpError> {
    let args = trim_line_ending(args).trim_start();

    let rest = args
        .get(..keyword.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(keyword))
        .map(|_| args[keyword.len()..].trim_start())
        .ok_or_else(|| SmtpError::InvalidSyntax(format!("Expected '{keyword}<address>'")))?;

    let path = rest.strip_prefix('<').ok_or_else(|| {
        SmtpError::InvalidSyntax("Address must be enclosed in angle brackets".to_string())
    })?;

    let close = path.find('>').ok_or_else(|| {
        SmtpError::InvalidSyntax("Address must be enclosed in angle brackets".to_string())
    })?;

    let address = Address::parse(&path[..close])?;
    let parameters = path[close + 1..]
        .split_whitespace()
        .map(str::to_owned)
        .collect();

    Ok((address, parameters))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_token() {
        assert_eq!(split_token("mail FROM:<a@b.c>\r\n"), ("MAIL".to_string(), " FROM:<a@b.c>\r\n"));
        assert_eq!(split_token("QUIT\r\n"), ("QUIT".to_string(), "\r\n"));
        assert_eq!(split_token("\r\n"), (String::new(), "\r\n"));
        assert_eq!(split_token("Rset"), ("RSET".to_string(), ""));
        assert_eq!(split_token("dataé\r\n"), ("DATA".to_string(), "é\r\n"));
        assert_eq!(split_token("ÉHLO x\r\n"), (String::new(), "ÉHLO x\r\n"));
    }

    #[test]
    fn test_from_token() {
        assert_eq!(Command::from_token("EHLO"), Some(Command::Ehlo));
        assert_eq!(Command::from_token("HELO"), Some(Command::Helo));
        assert_eq!(Command::from_token("NOOP"), None);
        assert_eq!(Command::from_token("ehlo"), None);
    }

    #[test]
    fn test_parse_mail_from() {
        let mail = parse_mail_from(" FROM:<sender@example.com>\r\n").unwrap();
        assert_eq!(mail.address.to_string(), "sender@example.com");
        assert!(mail.parameters.is_empty());
    }

    #[test]
    fn test_parse_mail_from_with_parameters() {
        let mail = parse_mail_from(" from: <userx@test.ex> SIZE=1000 BODY=8BITMIME\r\n").unwrap();
        assert_eq!(mail.address.domain(), "test.ex");
        assert_eq!(mail.parameters, vec!["SIZE=1000", "BODY=8BITMIME"]);
        assert_eq!(mail.declared_size(), Some(1000));
    }

    #[test]
    fn test_parse_rcpt_to() {
        let addr = parse_rcpt_to(" TO:<b@unknown.com>\r\n").unwrap();
        assert_eq!(addr.local_part(), "b");
        assert_eq!(addr.domain(), "unknown.com");
    }

    #[test]
    fn test_invalid_paths() {
        assert!(parse_mail_from(" sender@example.com").is_err());
        assert!(parse_mail_from(" FROM:sender@example.com").is_err());
        assert!(parse_mail_from(" FROM:<sender@example.com").is_err());
        assert!(parse_mail_from(" FROM:<>").is_err());
        assert!(parse_rcpt_to(" FROM:<a@b.c>").is_err());
        assert!(parse_rcpt_to("").is_err());
    }

    #[test]
    fn test_validate_address() {
        assert!(Address::parse("user@example.com").is_ok());
        assert!(Address::parse("invalid").is_err());
        assert!(Address::parse("@example.com").is_err());
        assert!(Address::parse("user@").is_err());
        assert!(Address::parse("us er@example.com").is_err());

        let long_user = "a".repeat(SmtpLimits::USER_MAX_LENGTH + 1) + "@example.com";
        assert!(matches!(
            Address::parse(&long_user),
            Err(SmtpError::UserTooLong { .. })
        ));

        let long_path = "user@".to_string() + &"a".repeat(SmtpLimits::PATH_MAX_LENGTH);
        assert!(matches!(
            Address::parse(&long_path),
            Err(SmtpError::PathTooLong { .. })
        ));
    }
}
