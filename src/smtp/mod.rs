//! SMTP protocol front end

pub mod commands;
pub mod config;
pub mod email;
pub mod error;
pub mod relay;
pub mod response;
pub mod server;
pub mod session;
pub mod transaction;
pub mod transport;

pub use commands::{Address, Command, MailFrom};
pub use config::SmtpConfig;
pub use email::Email;
pub use error::{SmtpError, SmtpLimits};
pub use relay::{RelayDecision, RelayPolicy};
pub use response::{Reply, ReplyCode};
pub use server::SmtpServer;
pub use session::{
    AuditEntry, AuditLog, Direction, HookAction, Mode, SessionHook, SmtpSession, SmtpState,
};
pub use transaction::Transaction;
pub use transport::{BufferTransport, TcpTransport, Transport};
