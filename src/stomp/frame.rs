//! STOMP 1.2 frame encoding and parsing
//!
//! One WebSocket text message carries one frame. A message made only of
//! EOLs is a heart-beat.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame ended before {0}")]
    Truncated(&'static str),
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("header line without ':' ({0:?})")]
    BadHeader(String),
    #[error("invalid escape sequence in header {0:?}")]
    BadEscape(String),
    #[error("invalid content-length {0:?}")]
    BadContentLength(String),
    #[error("body is not valid UTF-8")]
    NotUtf8,
}

/// STOMP commands, client and server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "ACK" => Command::Ack,
            "NACK" => Command::Nack,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            _ => return None,
        })
    }

    /// CONNECT and CONNECTED headers are not escaped
    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

/// A single STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// What one WebSocket text message decoded to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Heartbeat,
    Frame(Frame),
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header; repeated headers keep the first occurrence
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    // ========================================================================
    // Client frames
    // ========================================================================

    pub fn connect(host: &str, heart_beat: &str) -> Self {
        Frame::new(Command::Connect)
            .header("accept-version", "1.2,1.1,1.0")
            .header("host", host)
            .header("heart-beat", heart_beat)
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
    }

    /// SEND with a JSON body
    pub fn send(destination: &str, body: impl Into<String>) -> Self {
        Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .with_body(body)
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    /// Serialize to the wire: command, headers, blank line, body, NUL.
    /// A `content-length` header is added for non-empty bodies.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            push_header_part(&mut out, name, escape);
            out.push(':');
            push_header_part(&mut out, value, escape);
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

fn push_header_part(out: &mut String, part: &str, escape: bool) {
    if !escape {
        out.push_str(part);
        return;
    }
    for c in part.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            _ => out.push(c),
        }
    }
}

fn unescape(part: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(part.len());
    let mut chars = part.chars();
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
            _ => return Err(FrameError::BadEscape(part.to_string())),
        }
    }
    Ok(out)
}

/// Split off one line (EOL is `\n` or `\r\n`)
fn next_line<'a>(input: &'a str, what: &'static str) -> Result<(&'a str, &'a str), FrameError> {
    let idx = input.find('\n').ok_or(FrameError::Truncated(what))?;
    let line = &input[..idx];
    Ok((line.strip_suffix('\r').unwrap_or(line), &input[idx + 1..]))
}

/// Parse one WebSocket text message
pub fn parse(text: &str) -> Result<Incoming, FrameError> {
    let rest = text.trim_start_matches(['\r', '\n']);
    if rest.is_empty() {
        return Ok(Incoming::Heartbeat);
    }

    let (command_line, mut rest) = next_line(rest, "end of command line")?;
    let command = Command::parse(command_line)
        .ok_or_else(|| FrameError::UnknownCommand(command_line.to_string()))?;
    let escape = command.escapes_headers();

    let mut headers = Vec::new();
    loop {
        let (line, after) = next_line(rest, "end of headers")?;
        rest = after;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::BadHeader(line.to_string()))?;
        if escape {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| FrameError::BadContentLength(v.clone()))
        })
        .transpose()?;

    let bytes = rest.as_bytes();
    let body_len = match content_length {
        Some(len) => {
            if bytes.len() <= len || bytes[len] != 0 {
                return Err(FrameError::Truncated("NUL after content-length body"));
            }
            len
        }
        None => bytes
            .iter()
            .position(|b| *b == 0)
            .ok_or(FrameError::Truncated("NUL terminator"))?,
    };
    let body = std::str::from_utf8(&bytes[..body_len]).map_err(|_| FrameError::NotUtf8)?;

    Ok(Incoming::Frame(Frame {
        command,
        headers,
        body: body.to_string(),
    }))
}
