//! The SMTP command parser: a pure function from an input line to either a
//! structured [`Command`] or a syntax-error [`Response`].
//!
//! Grounded on `pkg/smtpd/command.go` in the original mailmock implementation,
//! adjusted to spec.md §4.1's verb table (notably VRFY takes one positional
//! argument here, where the Go original took none).

use std::collections::HashMap;

use crate::reply::Response;

/// A single declared argument slot for a verb: either positional (empty
/// name) or named (`KEY:value` form, uppercased key).
#[derive(Clone, Copy)]
enum Slot {
    Positional,
    Named(&'static str),
}

struct VerbSpec {
    slots: &'static [Slot],
    strict: bool,
}

const HELLO_SLOTS: &[Slot] = &[Slot::Positional];
const MAIL_SLOTS: &[Slot] = &[Slot::Named("FROM")];
const RCPT_SLOTS: &[Slot] = &[Slot::Named("TO")];
const EMPTY_SLOTS: &[Slot] = &[];
const VRFY_SLOTS: &[Slot] = &[Slot::Positional];

fn verb_spec(name: &str) -> Option<VerbSpec> {
    Some(match name {
        "HELO" | "EHLO" => VerbSpec { slots: HELLO_SLOTS, strict: true },
        "MAIL" => VerbSpec { slots: MAIL_SLOTS, strict: true },
        "RCPT" => VerbSpec { slots: RCPT_SLOTS, strict: true },
        "DATA" | "RSET" | "QUIT" => VerbSpec { slots: EMPTY_SLOTS, strict: true },
        "NOOP" => VerbSpec { slots: EMPTY_SLOTS, strict: false },
        "VRFY" => VerbSpec { slots: VRFY_SLOTS, strict: true },
        _ => return None,
    })
}

/// A parsed SMTP command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The original, unmodified line as received from the client.
    pub raw: String,
    /// The uppercased verb.
    pub name: String,
    /// Positional arguments, in declared order.
    pub positional: Vec<String>,
    /// Named arguments (`KEY:value`), keyed by uppercased key.
    pub named: HashMap<String, String>,
}

impl Command {
    /// Convenience accessor for a named argument.
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.named.get(key).map(String::as_str)
    }
}

/// Parses one line into a [`Command`], or a syntax-error [`Response`]
/// (`500`/`501`) if the line is malformed. Pure and total; never touches
/// session state.
pub fn parse(line: &str) -> Result<Command, Response> {
    let tokens: Vec<&str> = line.split(' ').collect();
    let verb = tokens[0].trim().to_uppercase();
    let args = &tokens[1..];

    let spec = verb_spec(&verb).ok_or_else(|| {
        Response::new(500, "Syntax error, command unrecognized")
    })?;

    let expected = spec.slots.len();
    if args.len() < expected {
        return Err(Response::new(501, "Syntax error in parameters or arguments"));
    }
    if args.len() > expected && spec.strict {
        return Err(Response::new(501, "Syntax error in parameters or arguments"));
    }

    let mut positional = Vec::new();
    let mut named = HashMap::new();

    for (slot, token) in spec.slots.iter().zip(args.iter()) {
        match slot {
            Slot::Named(key) => {
                if token.matches(':').count() != 1 {
                    return Err(Response::new(501, "Syntax error in parameters or arguments"));
                }
                let (prefix, suffix) = token.split_once(':').unwrap();
                if prefix.to_uppercase() != *key {
                    return Err(Response::new(501, "Syntax error in parameters or arguments"));
                }
                let value = suffix.trim();
                if value.is_empty() {
                    return Err(Response::new(501, "Syntax error in parameters or arguments"));
                }
                named.insert((*key).to_string(), value.to_string());
            }
            Slot::Positional => {
                if token.is_empty() {
                    return Err(Response::new(501, "Syntax error in parameters or arguments"));
                }
                positional.push(token.trim().to_string());
            }
        }
    }

    Ok(Command {
        raw: line.to_string(),
        name: verb,
        positional,
        named,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_verb_is_500() {
        let r = parse("FAKE test").unwrap_err();
        assert_eq!(r.code(), 500);
    }

    #[test]
    fn helo_requires_one_positional() {
        let cmd = parse("HELO localhost").unwrap();
        assert_eq!(cmd.name, "HELO");
        assert_eq!(cmd.positional, vec!["localhost".to_string()]);

        let err = parse("HELO").unwrap_err();
        assert_eq!(err.code(), 501);

        let err = parse("HELO a b").unwrap_err();
        assert_eq!(err.code(), 501);
    }

    #[test]
    fn verbs_are_case_insensitive_name_is_uppercased() {
        let cmd = parse("helo localhost").unwrap();
        assert_eq!(cmd.name, "HELO");
    }

    #[test]
    fn mail_from_named_arg() {
        let cmd = parse("MAIL FROM:<sender@example.com>").unwrap();
        assert_eq!(cmd.name, "MAIL");
        assert_eq!(cmd.arg("FROM"), Some("<sender@example.com>"));
    }

    #[test]
    fn mail_from_key_is_case_insensitive() {
        let cmd = parse("MAIL from:<sender@example.com>").unwrap();
        assert_eq!(cmd.arg("FROM"), Some("<sender@example.com>"));
    }

    #[test]
    fn mail_from_lenient_about_bracketless_value() {
        // Open Question in spec.md: do not attempt mailbox validation.
        let cmd = parse("MAIL FROM:t").unwrap();
        assert_eq!(cmd.arg("FROM"), Some("t"));
    }

    #[test]
    fn mail_missing_colon_is_501() {
        let err = parse("MAIL FROM sender").unwrap_err();
        assert_eq!(err.code(), 501);
    }

    #[test]
    fn mail_wrong_key_is_501() {
        let err = parse("MAIL TO:<x@y>").unwrap_err();
        assert_eq!(err.code(), 501);
    }

    #[test]
    fn mail_empty_value_is_501() {
        let err = parse("MAIL FROM:   ").unwrap_err();
        assert_eq!(err.code(), 501);
    }

    #[test]
    fn rcpt_to_named_arg() {
        let cmd = parse("RCPT TO:<recipient@example.com>").unwrap();
        assert_eq!(cmd.arg("TO"), Some("<recipient@example.com>"));
    }

    #[test]
    fn data_rset_quit_take_no_arguments() {
        for verb in ["DATA", "RSET", "QUIT"] {
            let cmd = parse(verb).unwrap();
            assert_eq!(cmd.name, verb);
            assert!(cmd.positional.is_empty());

            let err = parse(&format!("{verb} extra")).unwrap_err();
            assert_eq!(err.code(), 501);
        }
    }

    #[test]
    fn noop_allows_and_discards_trailing_tokens() {
        let cmd = parse("NOOP").unwrap();
        assert_eq!(cmd.name, "NOOP");

        let cmd = parse("NOOP ignored extra tokens").unwrap();
        assert_eq!(cmd.name, "NOOP");
        assert!(cmd.positional.is_empty());
    }

    #[test]
    fn vrfy_takes_one_positional_argument() {
        let cmd = parse("VRFY someone").unwrap();
        assert_eq!(cmd.positional, vec!["someone".to_string()]);

        let err = parse("VRFY").unwrap_err();
        assert_eq!(err.code(), 501);
    }

    #[test]
    fn raw_preserves_original_line() {
        let cmd = parse("HELO localhost").unwrap();
        assert_eq!(cmd.raw, "HELO localhost");
    }
}
