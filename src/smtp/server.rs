//! Reference TCP front end driving one session per connection

use crate::smtp::commands::Command;
use crate::smtp::config::SmtpConfig;
use crate::smtp::email::Email;
use crate::smtp::error::SmtpError;
use crate::smtp::session::SmtpSession;
use crate::smtp::transport::{TcpTransport, Transport};

use log::{error, info, warn};
use std::io::{BufRead, BufReader};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, mpsc};
use std::thread;

/// Accepts connections, frames their input into lines and feeds each line
/// to a session. Completed messages are sent to a channel.
#[derive(Debug, Clone)]
pub struct SmtpServer {
    config: Arc<SmtpConfig>,
}

impl SmtpServer {
    /// Server sharing `config` with every session
    pub fn new(config: SmtpConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Configuration handed to each session
    pub fn config(&self) -> &SmtpConfig {
        &self.config
    }

    /// Start the server on the specified address (blocking)
    pub fn start(&self, addr: &str, email_sender: mpsc::Sender<Email>) -> Result<(), SmtpError> {
        let listener = TcpListener::bind(addr)?;
        self.start_with_listener(listener, email_sender)
    }

    /// Start the server with an existing listener (blocking)
    pub fn start_with_listener(
        &self,
        listener: TcpListener,
        email_sender: mpsc::Sender<Email>,
    ) -> Result<(), SmtpError> {
        info!("SMTP server listening on {}", listener.local_addr()?);

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let config = Arc::clone(&self.config);
                    let email_sender = email_sender.clone();
                    thread::spawn(move || {
                        if let Err(e) = handle_client(config, stream, &email_sender) {
                            warn!("Error handling client: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }

        Ok(())
    }
}

/// Drive one connection until the client quits, the session closes the
/// connection or the peer goes away.
fn handle_client(
    config: Arc<SmtpConfig>,
    stream: TcpStream,
    email_sender: &mpsc::Sender<Email>,
) -> Result<(), SmtpError> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut session = SmtpSession::new(config, TcpTransport::new(stream));
    info!(
        "session {} connected from {}",
        session.id(),
        session.transport().remote_address()
    );

    session.greet()?;

    let mut line = Vec::new();
    while !session.is_closed() {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }

        session.feed(&line);

        if session.command() == Some(Command::DataEnd) {
            if let Some(email) = Email::from_transaction(session.id(), session.transaction()) {
                info!(
                    "session {} accepted message from {} for {} recipients",
                    session.id(),
                    email.from,
                    email.to.len()
                );
                // Errors when there are no listeners.
                let _ = email_sender.send(email);
            }
        }
    }

    info!("session {} finished", session.id());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    fn start_test_server() -> (String, mpsc::Receiver<Email>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = SmtpServer::new(
            SmtpConfig::new("test.local").with_served_domains(["example.com"]),
        );
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let _ = server.start_with_listener(listener, tx);
        });

        (addr, rx)
    }

    fn read_reply(reader: &mut BufReader<TcpStream>) -> String {
        let mut reply = String::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            reply.push_str(&line);
            if line.len() < 4 || line.as_bytes()[3] != b'-' {
                return reply;
            }
        }
    }

    #[test]
    fn test_server_creation() {
        let server = SmtpServer::new(SmtpConfig::new("test.local"));
        assert_eq!(server.config().hostname(), "test.local");
    }

    #[test]
    fn test_complete_smtp_session() {
        let (addr, rx) = start_test_server();
        let mut stream = TcpStream::connect(&addr).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        assert!(read_reply(&mut reader).starts_with("220 test.local"));

        for (command, expected) in [
            ("EHLO client.local\r\n", "250"),
            ("MAIL FROM:<test@example.com>\r\n", "250"),
            ("RCPT TO:<recipient@example.com>\r\n", "250"),
            ("DATA\r\n", "354"),
        ] {
            stream.write_all(command.as_bytes()).unwrap();
            assert!(read_reply(&mut reader).starts_with(expected), "{command}");
        }

        stream
            .write_all(b"Subject: Test Email\r\n\r\nThis is a test email.\r\n.\r\n")
            .unwrap();
        assert!(read_reply(&mut reader).starts_with("250 OK - "));

        stream.write_all(b"QUIT\r\n").unwrap();
        assert!(read_reply(&mut reader).starts_with("221 2.0.0 closing connection"));

        let email = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(email.from, "test@example.com");
        assert_eq!(email.to, vec!["recipient@example.com"]);
        assert_eq!(email.subject(), Some("Test Email"));
        assert!(email.data.contains("This is a test email."));
    }
}
