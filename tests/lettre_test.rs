use lettre::message::{Mailbox, Message};
use lettre::{SmtpTransport, Transport};
use relaymail::spool::{MemorySpool, SpoolStore};
use relaymail::SmtpServer;
use std::error::Error;
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

#[test]
fn basic_lettre_send() -> Result<(), Box<dyn Error>> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    let spool = Arc::new(MemorySpool::new());
    let server = SmtpServer::new("localhost", spool.clone());

    thread::spawn(move || server.serve(listener).expect("server failed"));

    let message = Message::builder()
        .from("花子 <hanako@example.com>".parse::<Mailbox>()?)
        .to("太郎 <tarou@example.com>".parse::<Mailbox>()?)
        .subject("件名")
        .body("本文".to_owned())?;

    let mailer = SmtpTransport::builder_dangerous("127.0.0.1")
        .port(port)
        .build();

    mailer.send(&message)?;

    let pending = spool.list_pending()?;
    assert_eq!(pending.len(), 1);
    let stored = spool.load(&pending[0].id)?;
    assert_eq!(stored.sender, "hanako@example.com");
    assert_eq!(stored.recipients, vec!["tarou@example.com"]);
    assert!(stored.body.iter().any(|line| line.starts_with("Subject:")));

    Ok(())
}
