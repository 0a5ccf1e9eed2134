use mailgate::{SmtpConfig, SmtpServer};
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};
use std::env;
use std::sync::mpsc;
use std::thread;

fn main() {
    let log_config = ConfigBuilder::new().add_filter_allow_str("mailgate").build();
    if let Err(e) = TermLogger::init(
        LevelFilter::Debug,
        log_config,
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ) {
        eprintln!("Failed to initialise logging: {e}");
    }

    let args: Vec<String> = env::args().collect();

    let addr = if args.len() > 1 {
        args[1].as_str()
    } else {
        "127.0.0.1:2525"
    };

    let hostname = if args.len() > 2 {
        args[2].as_str()
    } else {
        "mailgate.local"
    };

    let domains = args.iter().skip(3);

    log::info!("Starting mailgate on {addr} as {hostname}");

    let config = SmtpConfig::new(hostname).with_served_domains(domains);
    let (tx, rx) = mpsc::channel::<mailgate::Email>();
    let server = SmtpServer::new(config);

    thread::spawn(move || {
        let mut count = 0;
        while let Ok(email) = rx.recv() {
            count += 1;
            log::info!(
                "Received email #{} from: {} to: {:?}",
                count,
                email.from,
                email.to
            );
            if let Some(subject) = email.subject() {
                log::info!("  Subject: {subject}");
            }
        }
    });

    if let Err(e) = server.start(addr, tx) {
        log::error!("Failed to start server: {e}");
        std::process::exit(1);
    }
}
