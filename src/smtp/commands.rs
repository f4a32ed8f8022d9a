//! Command verbs and argument parsing

use crate::smtp::error::SmtpError;

/// The command keyword of a protocol line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Helo,
    Ehlo,
    Mail,
    Rcpt,
    Data,
    Rset,
    Quit,
    Noop,
    Help,
    Vrfy,
    Expn,
    Unknown,
}

impl Verb {
    /// Classify a line by its first four characters, ignoring case.
    ///
    /// Anything after the keyword, including its arguments, is not looked at.
    pub fn parse(line: &str) -> Self {
        let keyword: String = line
            .chars()
            .take(4)
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match keyword.as_str() {
            "helo" => Verb::Helo,
            "ehlo" => Verb::Ehlo,
            "mail" => Verb::Mail,
            "rcpt" => Verb::Rcpt,
            "data" => Verb::Data,
            "rset" => Verb::Rset,
            "quit" => Verb::Quit,
            "noop" => Verb::Noop,
            "help" => Verb::Help,
            "vrfy" => Verb::Vrfy,
            "expn" => Verb::Expn,
            _ => Verb::Unknown,
        }
    }

    /// Verbs that open or extend a mail transaction
    pub fn is_transaction(self) -> bool {
        matches!(self, Verb::Mail | Verb::Rcpt | Verb::Data)
    }
}

/// Extract the address between the first `<` and the last `>` of a line.
///
/// The address must be at least three characters long and contain an `@`.
pub fn extract_address(line: &str) -> Result<String, SmtpError> {
    let open = line
        .find('<')
        .ok_or(SmtpError::InvalidAddress("open angle ('<') expected but not found"))?;
    let close = line
        .rfind('>')
        .ok_or(SmtpError::InvalidAddress("close angle ('>') expected but not found"))?;
    if close < open {
        return Err(SmtpError::InvalidAddress("malformed address delimiters"));
    }

    let address = &line[open + 1..close];
    if address.chars().count() < 3 || !address.contains('@') {
        return Err(SmtpError::InvalidAddress("malformed address"));
    }

    Ok(address.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_verb_is_case_insensitive() {
        assert_eq!(Verb::parse("HELO client.local"), Verb::Helo);
        assert_eq!(Verb::parse("ehlo client.local"), Verb::Ehlo);
        assert_eq!(Verb::parse("Mail FROM:<a@b.com>"), Verb::Mail);
        assert_eq!(Verb::parse("rCpT TO:<a@b.com>"), Verb::Rcpt);
        assert_eq!(Verb::parse("quit"), Verb::Quit);
    }

    #[test]
    fn test_verb_only_looks_at_keyword() {
        assert_eq!(Verb::parse("QUITTING"), Verb::Quit);
        assert_eq!(Verb::parse("DATAx"), Verb::Data);
        assert_eq!(Verb::parse("QUI"), Verb::Unknown);
        assert_eq!(Verb::parse(""), Verb::Unknown);
        assert_eq!(Verb::parse("INVALID"), Verb::Unknown);
        assert_eq!(Verb::parse("ünïc"), Verb::Unknown);
    }

    #[test]
    fn test_every_keyword_is_recognised() {
        let keywords = [
            ("HELO", Verb::Helo),
            ("EHLO", Verb::Ehlo),
            ("MAIL", Verb::Mail),
            ("RCPT", Verb::Rcpt),
            ("DATA", Verb::Data),
            ("RSET", Verb::Rset),
            ("QUIT", Verb::Quit),
            ("NOOP", Verb::Noop),
            ("HELP", Verb::Help),
            ("VRFY", Verb::Vrfy),
            ("EXPN", Verb::Expn),
        ];
        for (keyword, verb) in keywords {
            assert_eq!(Verb::parse(keyword), verb);
        }
    }

    #[test]
    fn test_extract_address() {
        assert_eq!(extract_address("MAIL FROM:<a@b.com>").unwrap(), "a@b.com");
        assert_eq!(
            extract_address("RCPT TO: <user@example.com> NOTIFY=NEVER").unwrap(),
            "user@example.com"
        );
        // Last '>' wins
        assert_eq!(extract_address("MAIL FROM:<a@b> x>").unwrap(), "a@b> x");
    }

    #[test]
    fn test_extract_address_failures() {
        assert!(extract_address("RCPT TO:<bad>").is_err());
        assert!(extract_address("RCPT TO:a@b.com").is_err());
        assert!(extract_address("RCPT TO:<a@b.com").is_err());
        assert!(extract_address("RCPT TO:a@b.com>").is_err());
        assert!(extract_address("RCPT TO:>a@b.com<").is_err());
        assert!(extract_address("MAIL FROM:<@>").is_err());
        assert!(extract_address("MAIL FROM:<>").is_err());
        assert!(extract_address("MAIL FROM:<a@>").is_err());
        assert_eq!(extract_address("MAIL FROM:<a@b>").unwrap(), "a@b");
    }

    proptest! {
        #[test]
        fn prop_extracts_exact_address(
            local in "[a-z0-9._-]{1,20}",
            domain in "[a-z0-9-]{1,20}\\.[a-z]{2,6}",
            prefix in "[A-Za-z :]{0,12}",
        ) {
            let address = format!("{local}@{domain}");
            let line = format!("{prefix}<{address}>");
            prop_assert_eq!(extract_address(&line).unwrap(), address);
        }

        #[test]
        fn prop_no_angle_brackets_never_parse(line in "[^<>]*") {
            prop_assert!(extract_address(&line).is_err());
        }

        #[test]
        fn prop_no_at_sign_never_parses(inner in "[^@<>]*") {
            let line = format!("RCPT TO:<{inner}>");
            prop_assert!(extract_address(&line).is_err());
        }
    }
}
