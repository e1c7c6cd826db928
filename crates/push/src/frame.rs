use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// STOMP 1.2 frame commands used by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl StompCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Message => "MESSAGE",
            StompCommand::Receipt => "RECEIPT",
            StompCommand::Error => "ERROR",
            StompCommand::Disconnect => "DISCONNECT",
        }
    }

    /// CONNECT and CONNECTED headers are not escaped
    fn escapes_headers(&self) -> bool {
        !matches!(self, StompCommand::Connect | StompCommand::Connected)
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StompCommand {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" | "STOMP" => StompCommand::Connect,
            "CONNECTED" => StompCommand::Connected,
            "SUBSCRIBE" => StompCommand::Subscribe,
            "UNSUBSCRIBE" => StompCommand::Unsubscribe,
            "MESSAGE" => StompCommand::Message,
            "RECEIPT" => StompCommand::Receipt,
            "ERROR" => StompCommand::Error,
            "DISCONNECT" => StompCommand::Disconnect,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("malformed header line: {0}")]
    MalformedHeader(String),

    #[error("invalid escape sequence in header: {0}")]
    InvalidEscape(String),

    #[error("frame is not NUL terminated")]
    Unterminated,

    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),
}

/// A single STOMP frame
#[derive(Debug, Clone, PartialEq)]
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

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// CONNECT with heart-beats disabled
    pub fn connect(host: &str) -> Self {
        Self::new(StompCommand::Connect)
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("heart-beat", "0,0")
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(StompCommand::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    pub fn disconnect() -> Self {
        Self::new(StompCommand::Disconnect)
    }

    /// First value of `name`; repeated headers keep the first occurrence
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');

        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.header("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode one frame. Leading EOLs (heart-beats) are skipped.
    pub fn decode(raw: &str) -> Result<Self, FrameError> {
        let raw = raw.trim_start_matches(['\r', '\n']);
        if raw.is_empty() {
            return Err(FrameError::Empty);
        }

        let (head, rest) = match raw.find("\n\n") {
            Some(i) => (&raw[..i], &raw[i + 2..]),
            None => match raw.find("\r\n\r\n") {
                Some(i) => (&raw[..i], &raw[i + 4..]),
                None => return Err(FrameError::Unterminated),
            },
        };

        let mut lines = head.lines();
        let command: StompCommand = lines.next().ok_or(FrameError::Empty)?.trim_end().parse()?;
        let escape = command.escapes_headers();

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if escape {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let frame = Self {
            command,
            headers,
            body: String::new(),
        };

        let body = match frame.header("content-length") {
            Some(len) => {
                let len: usize = len
                    .trim()
                    .parse()
                    .map_err(|_| FrameError::InvalidContentLength(len.to_string()))?;
                match rest.get(..len) {
                    Some(body) if rest[len..].starts_with('\0') => body,
                    _ => return Err(FrameError::Unterminated),
                }
            }
            None => {
                let end = rest.find('\0').ok_or(FrameError::Unterminated)?;
                &rest[..end]
            }
        };

        Ok(Self {
            body: body.to_string(),
            ..frame
        })
    }
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(value.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_connect() {
        let encoded = StompFrame::connect("localhost").encode();
        assert_eq!(
            encoded,
            "CONNECT\naccept-version:1.2\nhost:localhost\nheart-beat:0,0\n\n\0"
        );
    }

    #[test]
    fn test_encode_subscribe() {
        let encoded = StompFrame::subscribe("sub-0", "/topic/dispense-status").encode();
        assert_eq!(
            encoded,
            "SUBSCRIBE\nid:sub-0\ndestination:/topic/dispense-status\nack:auto\n\n\0"
        );
    }

    #[test]
    fn test_decode_message_with_content_length() {
        let body = r#"{"type":"BATCH_EXECUTION_COMPLETED"}"#;
        let raw = format!(
            "MESSAGE\ndestination:/topic/dispense-status\nsubscription:sub-0\nmessage-id:7\ncontent-type:application/json\ncontent-length:{}\n\n{}\0",
            body.len(),
            body
        );

        let frame = StompFrame::decode(&raw).unwrap();
        assert_eq!(frame.command, StompCommand::Message);
        assert_eq!(frame.header("destination"), Some("/topic/dispense-status"));
        assert_eq!(frame.body, body);
    }

    #[test]
    fn test_decode_body_without_content_length() {
        let frame = StompFrame::decode("ERROR\nmessage:bad destination\n\ndetails\0\n").unwrap();
        assert_eq!(frame.command, StompCommand::Error);
        assert_eq!(frame.header("message"), Some("bad destination"));
        assert_eq!(frame.body, "details");
    }

    #[test]
    fn test_decode_skips_leading_heartbeats() {
        let frame = StompFrame::decode("\n\nCONNECTED\nversion:1.2\n\n\0").unwrap();
        assert_eq!(frame.command, StompCommand::Connected);
        assert_eq!(frame.header("version"), Some("1.2"));
    }

    #[test]
    fn test_header_escaping() {
        let frame = StompFrame::new(StompCommand::Message).with_header("note", "a:b\nc");
        let encoded = frame.encode();
        assert!(encoded.contains("note:a\\cb\\nc\n"));
        assert_eq!(StompFrame::decode(&encoded).unwrap().header("note"), Some("a:b\nc"));
    }

    #[test]
    fn test_repeated_header_keeps_first() {
        let frame = StompFrame::decode("MESSAGE\nfoo:1\nfoo:2\n\n\0").unwrap();
        assert_eq!(frame.header("foo"), Some("1"));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(StompFrame::decode("\n"), Err(FrameError::Empty));
        assert_eq!(
            StompFrame::decode("BOGUS\n\n\0"),
            Err(FrameError::UnknownCommand("BOGUS".into()))
        );
        assert_eq!(
            StompFrame::decode("MESSAGE\nno-colon\n\n\0"),
            Err(FrameError::MalformedHeader("no-colon".into()))
        );
        assert_eq!(
            StompFrame::decode("MESSAGE\ndestination:/t\n\nbody"),
            Err(FrameError::Unterminated)
        );
        assert!(matches!(
            StompFrame::decode("MESSAGE\nbad:\\x\n\n\0"),
            Err(FrameError::InvalidEscape(_))
        ));
    }
}
