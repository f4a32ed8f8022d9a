//! Operator console on the main thread

use std::io::{self, BufRead, Write};

use tracing::warn;

use crate::spool::SpoolStore;

const HELP: &str = "commands: status, help, quit";

/// Read operator commands until `quit` or end of input.
///
/// This loop only reports on the relay; the server and the delivery loop
/// keep running on their own threads while it waits.
pub fn command_loop<R: BufRead, W: Write>(
    input: R,
    mut output: W,
    spool: &dyn SpoolStore,
) -> io::Result<()> {
    write!(output, "> ")?;
    output.flush()?;

    for line in input.lines() {
        match line?.trim() {
            "quit" | "exit" => return Ok(()),
            "" => {}
            "help" => writeln!(output, "{HELP}")?,
            "status" => match spool.list_pending() {
                Ok(items) => {
                    let waiting = items.iter().filter(|item| item.retry.attempts > 0).count();
                    writeln!(
                        output,
                        "{} message(s) pending, {waiting} after failed attempts",
                        items.len()
                    )?;
                }
                Err(e) => writeln!(output, "can't scan spool: {e}")?,
            },
            other => {
                warn!("unknown console command: {other}");
                writeln!(output, "unknown command '{other}'; {HELP}")?;
            }
        }
        write!(output, "> ")?;
        output.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smtp::Message;
    use crate::spool::MemorySpool;
    use chrono::Utc;
    use std::io::Cursor;

    fn run(input: &str, spool: &MemorySpool) -> String {
        let mut output = Vec::new();
        command_loop(Cursor::new(input.to_string()), &mut output, spool).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_status() {
        let spool = MemorySpool::new();
        let message = Message {
            sender: "a@b.com".to_string(),
            recipients: vec!["c@d.com".to_string()],
            body: Vec::new(),
        };
        let id = spool.enqueue(&message).unwrap();
        spool.enqueue(&message).unwrap();
        spool.record_failure(&id, Utc::now()).unwrap();

        let output = run("status\nquit\nstatus\n", &spool);
        assert!(output.contains("2 message(s) pending, 1 after failed attempts"));
        assert_eq!(output.matches("pending").count(), 1);
    }

    #[test]
    fn test_help_and_unknown() {
        let output = run("help\nfrobnicate\n", &MemorySpool::new());
        assert!(output.contains(HELP));
        assert!(output.contains("unknown command 'frobnicate'"));
    }
}
