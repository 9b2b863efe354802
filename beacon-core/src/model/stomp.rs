use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    Connect,
    Stomp,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Disconnect,
    Receipt,
    Error,
}

impl StompCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Stomp => "STOMP",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Send => "SEND",
            StompCommand::Message => "MESSAGE",
            StompCommand::Disconnect => "DISCONNECT",
            StompCommand::Receipt => "RECEIPT",
            StompCommand::Error => "ERROR",
        }
    }

    fn parse(line: &str) -> Option<Self> {
        Some(match line {
            "CONNECT" => StompCommand::Connect,
            "STOMP" => StompCommand::Stomp,
            "CONNECTED" => StompCommand::Connected,
            "SUBSCRIBE" => StompCommand::Subscribe,
            "UNSUBSCRIBE" => StompCommand::Unsubscribe,
            "SEND" => StompCommand::Send,
            "MESSAGE" => StompCommand::Message,
            "DISCONNECT" => StompCommand::Disconnect,
            "RECEIPT" => StompCommand::Receipt,
            "ERROR" => StompCommand::Error,
            _ => return None,
        })
    }

    // CONNECT and CONNECTED headers are sent verbatim for 1.0 compatibility.
    fn escapes_headers(self) -> bool {
        !matches!(self, StompCommand::Connect | StompCommand::Connected)
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StompError {
    #[error("empty frame")]
    Empty,
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("malformed header line '{0}'")]
    MalformedHeader(String),
    #[error("invalid escape sequence in '{0}'")]
    InvalidEscape(String),
    #[error("frame body is not terminated")]
    Unterminated,
    #[error("invalid content-length '{0}'")]
    InvalidContentLength(String),
}

/// A single STOMP 1.2 frame with a text body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First occurrence wins when a header is repeated.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());

        out.push_str(self.command.as_str());
        out.push('\n');

        for (key, value) in &self.headers {
            if key == "content-length" {
                continue;
            }
            if escape {
                out.push_str(&escape_header(key));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(key);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }

        if !self.body.is_empty() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decodes one frame. `Ok(None)` is a heart-beat (bare end-of-line).
    pub fn decode(text: &str) -> Result<Option<Self>, StompError> {
        let text = text.trim_start_matches(['\r', '\n']);
        if text.is_empty() {
            return Ok(None);
        }

        let (head, rest) = split_head(text).ok_or(StompError::Unterminated)?;
        let mut lines = head.lines();

        let command_line = lines.next().ok_or(StompError::Empty)?;
        let command = StompCommand::parse(command_line.trim_end_matches('\r'))
            .ok_or_else(|| StompError::UnknownCommand(command_line.to_owned()))?;

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| StompError::MalformedHeader(line.to_owned()))?;
            if command.escapes_headers() {
                headers.push((unescape_header(key)?, unescape_header(value)?));
            } else {
                headers.push((key.to_owned(), value.to_owned()));
            }
        }

        let frame = StompFrame {
            command,
            headers,
            body: String::new(),
        };

        let body = match frame.get("content-length") {
            Some(len) => {
                let len: usize = len
                    .trim()
                    .parse()
                    .map_err(|_| StompError::InvalidContentLength(len.to_owned()))?;
                let body = rest.get(..len).ok_or(StompError::Unterminated)?;
                if !rest[len..].starts_with('\0') {
                    return Err(StompError::Unterminated);
                }
                body
            }
            None => {
                let end = rest.find('\0').ok_or(StompError::Unterminated)?;
                &rest[..end]
            }
        };

        Ok(Some(StompFrame {
            body: body.to_owned(),
            ..frame
        }))
    }
}

fn split_head(text: &str) -> Option<(&str, &str)> {
    let lf = text.find("\n\n").map(|i| (i, 2));
    let crlf = text.find("\r\n\r\n").map(|i| (i, 4));

    let (idx, sep) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 < b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };

    Some((&text[..idx], &text[idx + sep..]))
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String, StompError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(StompError::InvalidEscape(value.to_owned())),
        }
    }
    Ok(out)
}
