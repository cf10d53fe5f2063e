//! STOMP 1.2 frame encoding and decoding
//!
//! Frames are text: a command line, `name:value` header lines, a blank
//! line, the body and a NUL terminator. A bare end-of-line between frames is
//! a heart-beat. Header escaping (`\\`, `\n`, `\r`, `\c`) applies to every
//! frame except CONNECT and CONNECTED.

use std::fmt;
use std::time::Duration;

use crate::error::FrameError;
use crate::message::Headers;

/// Protocol version list advertised in CONNECT
pub const ACCEPT_VERSION: &str = "1.2,1.1,1.0";

/// STOMP commands used by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    fn parse(line: &str) -> Result<Self, FrameError> {
        match line {
            "CONNECT" | "STOMP" => Ok(Command::Connect),
            "CONNECTED" => Ok(Command::Connected),
            "SEND" => Ok(Command::Send),
            "SUBSCRIBE" => Ok(Command::Subscribe),
            "UNSUBSCRIBE" => Ok(Command::Unsubscribe),
            "DISCONNECT" => Ok(Command::Disconnect),
            "MESSAGE" => Ok(Command::Message),
            "RECEIPT" => Ok(Command::Receipt),
            "ERROR" => Ok(Command::Error),
            other => Err(FrameError::UnknownCommand(other.to_string())),
        }
    }

    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    /// Headers in wire order; repeated names are allowed, first one wins
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// CONNECT frame advertising our heart-beat intervals
    pub fn connect(host: &str, outgoing: Duration, incoming: Duration) -> Self {
        Frame::new(Command::Connect)
            .header("accept-version", ACCEPT_VERSION)
            .header("host", host)
            .header(
                "heart-beat",
                format!("{},{}", outgoing.as_millis(), incoming.as_millis()),
            )
    }

    pub fn subscribe(id: &str, destination: &str, extra: &Headers) -> Self {
        let mut frame = Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto");
        for (name, value) in extra {
            if !matches!(name.as_str(), "id" | "destination" | "ack") {
                frame = frame.header(name.clone(), value.clone());
            }
        }
        frame
    }

    pub fn send(destination: &str, body: &str, extra: &Headers) -> Self {
        let mut frame = Frame::new(Command::Send).header("destination", destination);
        for (name, value) in extra {
            if !matches!(name.as_str(), "destination" | "content-length") {
                frame = frame.header(name.clone(), value.clone());
            }
        }
        frame.with_body(body)
    }

    pub fn disconnect(receipt: &str) -> Self {
        Frame::new(Command::Disconnect).header("receipt", receipt)
    }

    /// Serialize to wire text, adding `content-length` for non-empty bodies
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');

        let escape = self.command.escapes_headers();
        for (name, value) in &self.headers {
            if escape {
                push_escaped(&mut out, name);
                out.push(':');
                push_escaped(&mut out, value);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }

        if !self.body.is_empty() && self.get_header("content-length").is_none() {
            out.push_str("content-length:");
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode every frame in a chunk, skipping heart-beat EOLs
    pub fn parse_all(input: &str) -> Result<Vec<Frame>, FrameError> {
        let bytes = input.as_bytes();
        let mut pos = 0;
        let mut frames = Vec::new();

        loop {
            while pos < bytes.len() && matches!(bytes[pos], b'\n' | b'\r') {
                pos += 1;
            }
            if pos >= bytes.len() {
                break;
            }
            let (frame, consumed) = parse_one(&bytes[pos..])?;
            frames.push(frame);
            pos += consumed;
        }

        Ok(frames)
    }
}

fn parse_one(buf: &[u8]) -> Result<(Frame, usize), FrameError> {
    let mut cursor = 0;
    let command = Command::parse(read_line(buf, &mut cursor)?)?;
    let escaped = command.escapes_headers();

    let mut headers = Vec::new();
    loop {
        let line = read_line(buf, &mut cursor)?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
        if escaped {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(n, _)| n == "content-length")
        .map(|(_, v)| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| FrameError::InvalidContentLength(v.clone()))
        })
        .transpose()?;

    let rest = &buf[cursor..];
    let (body, consumed) = match content_length {
        Some(len) => {
            if rest.len() <= len || rest[len] != 0 {
                return Err(FrameError::Incomplete);
            }
            (&rest[..len], len + 1)
        }
        None => {
            let end = rest
                .iter()
                .position(|b| *b == 0)
                .ok_or(FrameError::Incomplete)?;
            (&rest[..end], end + 1)
        }
    };

    let body = std::str::from_utf8(body)
        .map_err(|_| FrameError::InvalidUtf8)?
        .to_string();

    Ok((
        Frame {
            command,
            headers,
            body,
        },
        cursor + consumed,
    ))
}

fn read_line<'a>(buf: &'a [u8], cursor: &mut usize) -> Result<&'a str, FrameError> {
    let rest = &buf[*cursor..];
    let end = rest
        .iter()
        .position(|b| *b == b'\n')
        .ok_or(FrameError::Incomplete)?;
    *cursor += end + 1;

    let line = rest[..end].strip_suffix(b"\r").unwrap_or(&rest[..end]);
    std::str::from_utf8(line).map_err(|_| FrameError::InvalidUtf8)
}

fn push_escaped(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
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
            _ => return Err(FrameError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

/// Negotiated heart-beat intervals `(outgoing, incoming)`
///
/// `server` is the CONNECTED frame's `heart-beat` header (`sx,sy` in ms).
/// A side is disabled when either party asked for 0; otherwise the larger
/// of the two values applies.
pub fn negotiate_heartbeat(
    client_outgoing: Duration,
    client_incoming: Duration,
    server: Option<&str>,
) -> (Option<Duration>, Option<Duration>) {
    let (sx, sy) = server
        .and_then(|value| {
            let (x, y) = value.split_once(',')?;
            Some((x.trim().parse::<u64>().ok()?, y.trim().parse::<u64>().ok()?))
        })
        .unwrap_or((0, 0));

    let cx = client_outgoing.as_millis() as u64;
    let cy = client_incoming.as_millis() as u64;

    let outgoing = (cx != 0 && sy != 0).then(|| Duration::from_millis(cx.max(sy)));
    let incoming = (cy != 0 && sx != 0).then(|| Duration::from_millis(cy.max(sx)));
    (outgoing, incoming)
}
