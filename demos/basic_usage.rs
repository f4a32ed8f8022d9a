//! Basic usage example for relaymail
//!
//! Runs two relays in one process: a front relay that spools to a
//! temporary directory, and a downstream relay that keeps what it receives
//! in memory. A message is sent to the front relay by hand, then one
//! delivery pass forwards it downstream.

use relaymail::spool::{DeliveryAgent, FsSpool, MemorySpool, RetryPolicy, SpoolStore, TcpConnector};
use relaymail::SmtpServer;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("relaymail Basic Usage Example");
    println!("=============================");

    // Downstream relay: everything it accepts stays in memory
    let downstream = Arc::new(MemorySpool::new());
    let downstream_listener = TcpListener::bind("127.0.0.1:0")?;
    let downstream_port = downstream_listener.local_addr()?.port();
    let server = SmtpServer::new("downstream.example", downstream.clone());
    thread::spawn(move || server.serve(downstream_listener));
    println!("Downstream relay on port {downstream_port}");

    // Front relay: spools to disk
    let spool_dir = tempfile::tempdir()?;
    let spool = Arc::new(FsSpool::open(spool_dir.path())?);
    let front_listener = TcpListener::bind("127.0.0.1:0")?;
    let front_addr = front_listener.local_addr()?;
    let server = SmtpServer::new("front.example", spool.clone());
    thread::spawn(move || server.serve(front_listener));
    println!("Front relay on {front_addr}, spooling to {}", spool_dir.path().display());

    println!("\nSending test email...");
    send_test_email(&front_addr.to_string())?;

    for item in spool.list_pending()? {
        println!("Spooled as {}", item.id);
    }

    println!("\nRunning one delivery pass...");
    let agent = DeliveryAgent::new(
        spool.clone(),
        Box::new(TcpConnector::new("127.0.0.1", downstream_port)),
        "front.example",
    )
    .with_policy(RetryPolicy::every_pass());
    let report = agent.run_pass()?;
    println!("Delivered: {}, failed: {}", report.delivered, report.failed);
    println!("Left in front spool: {}", spool.list_pending()?.len());

    for message in downstream.messages() {
        println!("Downstream received:");
        println!("  From: {}", message.sender);
        println!("  To: {:?}", message.recipients);
        for line in &message.body {
            println!("    {line}");
        }
    }

    Ok(())
}

fn send_test_email(addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = TcpStream::connect(addr)?;
    let mut reader = BufReader::new(stream.try_clone()?);

    let mut response = String::new();
    reader.read_line(&mut response)?;
    print!("S: {response}");

    let commands = [
        "HELO client.example.com",
        "MAIL FROM:<sender@example.com>",
        "RCPT TO:<recipient@example.com>",
        "RCPT TO:<another@example.com>",
        "DATA",
    ];
    for command in commands {
        write!(stream, "{command}\r\n")?;
        println!("C: {command}");
        response.clear();
        reader.read_line(&mut response)?;
        print!("S: {response}");
    }

    for line in [
        "From: sender@example.com",
        "To: recipient@example.com, another@example.com",
        "Subject: Test Email from relaymail",
        "",
        "This message goes through the spool",
        "before it reaches the downstream relay.",
        ".",
    ] {
        write!(stream, "{line}\r\n")?;
    }
    response.clear();
    reader.read_line(&mut response)?;
    print!("S: {response}");

    write!(stream, "QUIT\r\n")?;
    response.clear();
    reader.read_line(&mut response)?;
    print!("S: {response}");

    Ok(())
}
