//! The reply catalog: an immutable table of symbolic SMTP reply names.
//!
//! Mirrors `pkg/smtpd/msg/replies.go` in the original mailmock implementation,
//! but built as a value constructed once at startup (rather than a mutable
//! package-level registry) and passed explicitly to the parts of the core
//! that need it, per the redesign notes in spec.md §9.

use std::fmt;

/// A single SMTP reply: a three-digit code plus one or more text lines.
///
/// Wire form and history form differ (see [`Response::to_wire`] and the
/// `Display` impl respectively) — the wire form is CRLF-framed per line per
/// RFC 5321 §4.2.1, the `Display`/history form is newline-joined so each
/// line independently matches `^[2-5][0-9]{2}[- ] .*$`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    code: u16,
    lines: Vec<String>,
}

impl Response {
    /// Builds a single-line response.
    pub fn new(code: u16, line: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![line.into()],
        }
    }

    /// Builds a multi-line response. `lines` must be non-empty.
    pub fn multiline(code: u16, lines: Vec<String>) -> Self {
        assert!(!lines.is_empty(), "a Response must carry at least one line");
        Self { code, lines }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// True iff this response's code begins with `5` (RFC 5321 §4.2.1 permanent failure).
    pub fn is_error(&self) -> bool {
        self.code / 100 == 5
    }

    /// Serializes this response for the wire: every line but the last is
    /// `"<code>-<text>\r\n"`, the last is `"<code> <text>\r\n"`.
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        let last = self.lines.len() - 1;
        for (i, line) in self.lines.iter().enumerate() {
            let sep = if i == last { ' ' } else { '-' };
            out.push_str(&format!("{:03}{}{}\r\n", self.code, sep, line));
        }
        out
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self.lines.len() - 1;
        for (i, line) in self.lines.iter().enumerate() {
            let sep = if i == last { ' ' } else { '-' };
            write!(f, "{:03}{}{}", self.code, sep, line)?;
            if i != last {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// The catalog of canned replies, built once at startup with the resolved
/// hostname substituted for the `<domain>` placeholder.
#[derive(Debug, Clone)]
pub struct ReplyCatalog {
    host: String,
}

impl ReplyCatalog {
    /// Builds a catalog for the given host name, substituted into greeting
    /// and closing banners wherever spec.md calls for `<host>`.
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// `220 <host> Service ready`
    pub fn ready(&self) -> Response {
        Response::new(220, format!("{} Service ready", self.host))
    }

    /// `250 OK` — the generic success reply used for HELO/EHLO/MAIL/RCPT/NOOP/RSET.
    pub fn success(&self) -> Response {
        Response::new(250, "OK")
    }

    /// `354 Start mail input; end with <CRLF>.<CRLF>`
    pub fn start_data(&self) -> Response {
        Response::new(354, "Start mail input; end with <CRLF>.<CRLF>")
    }

    /// `221 <host> Service closing transmission channel`
    pub fn closing(&self) -> Response {
        Response::new(221, format!("{} Service closing transmission channel", self.host))
    }

    /// `421 <host> Service not available, closing transmission channel`
    pub fn service_not_available(&self) -> Response {
        Response::new(
            421,
            format!("{} Service not available, closing transmission channel", self.host),
        )
    }

    /// `421 <host> Service not available, closing transmission channel` variant
    /// used when the read deadline expires mid-session.
    pub fn session_timed_out(&self) -> Response {
        Response::new(
            421,
            format!(
                "{} Service not available, closing transmission channel: Your session timed out",
                self.host
            ),
        )
    }

    /// `451 Requested action aborted: error in processing`
    pub fn protocol_abort(&self) -> Response {
        Response::new(451, "Requested action aborted: error in processing")
    }

    /// `503 Bad sequence of commands`
    pub fn bad_sequence(&self) -> Response {
        Response::new(503, "Bad sequence of commands")
    }

    /// `554 No valid recipients`
    pub fn no_valid_recipients(&self) -> Response {
        Response::new(554, "No valid recipients")
    }

    /// `502 Command not implemented`
    pub fn not_implemented(&self) -> Response {
        Response::new(502, "Command not implemented")
    }

    /// `500 Syntax error, command unrecognized`
    pub fn syntax_error(&self) -> Response {
        Response::new(500, "Syntax error, command unrecognized")
    }

    /// `501 Syntax error in parameters or arguments`
    pub fn parameter_error(&self) -> Response {
        Response::new(501, "Syntax error in parameters or arguments")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_form_frames_each_line_with_crlf() {
        let r = Response::multiline(250, vec!["first".into(), "second".into()]);
        assert_eq!(r.to_wire(), "250-first\r\n250 second\r\n");
    }

    #[test]
    fn single_line_wire_form() {
        let r = Response::new(220, "hi");
        assert_eq!(r.to_wire(), "220 hi\r\n");
    }

    #[test]
    fn display_matches_reply_regex_per_line() {
        let r = Response::multiline(250, vec!["a".into(), "b".into()]);
        let s = r.to_string();
        for line in s.lines() {
            assert!(line.len() >= 4, "line too short: {line:?}");
            let code: String = line.chars().take(3).collect();
            assert!(code.parse::<u16>().is_ok());
            let sep = line.chars().nth(3).unwrap();
            assert!(sep == '-' || sep == ' ');
        }
    }

    #[test]
    fn is_error_only_for_5xx() {
        assert!(Response::new(550, "x").is_error());
        assert!(!Response::new(250, "x").is_error());
        assert!(!Response::new(421, "x").is_error());
    }

    #[test]
    fn catalog_substitutes_host() {
        let catalog = ReplyCatalog::new("mailmock.test");
        assert_eq!(catalog.ready().to_wire(), "220 mailmock.test Service ready\r\n");
        assert_eq!(
            catalog.closing().to_wire(),
            "221 mailmock.test Service closing transmission channel\r\n"
        );
    }
}
