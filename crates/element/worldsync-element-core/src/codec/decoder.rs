use std::io::Read;

use crate::{Element, ElementKind};

use super::{Bridge, CodecError};

/// Deepest nesting accepted before decoding is aborted.
pub const MAX_DEPTH: usize = 512;

const CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Collecting character data up to the next `<`.
    Text,
    /// Collecting a tag body up to the next `>`.
    Tag,
}

#[derive(Debug)]
enum Frame {
    Stream,
    Map,
    List,
    Scalar {
        kind: ElementKind,
        name: Option<String>,
        text: String,
    },
}

impl Frame {
    fn tag(&self) -> &'static str {
        match self {
            Frame::Stream => "atlas",
            Frame::Map => "map",
            Frame::List => "list",
            Frame::Scalar { kind, .. } => kind.as_str(),
        }
    }
}

#[derive(Debug)]
struct Tag<'a> {
    name: &'a str,
    closing: bool,
    self_closing: bool,
    item_name: Option<String>,
}

/// Incremental, push-based decoder for the text encoding.
///
/// Bytes are fed in arbitrary chunks; every complete tag or text run is
/// turned into events on the wrapped [`Bridge`].
#[derive(Debug)]
pub struct Decoder<B: Bridge> {
    bridge: B,
    state: State,
    pending: Vec<u8>,
    stack: Vec<Frame>,
    started: bool,
    finished: bool,
    offset: usize,
    token_start: usize,
}

impl<B: Bridge> Decoder<B> {
    pub fn new(bridge: B) -> Self {
        Self {
            bridge,
            state: State::Text,
            pending: Vec::new(),
            stack: Vec::new(),
            started: false,
            finished: false,
            offset: 0,
            token_start: 0,
        }
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn into_bridge(self) -> B {
        self.bridge
    }

    /// True once the closing stream tag has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Read one chunk from `reader` and feed it.
    ///
    /// Returns `Ok(true)` while more input may follow, `Ok(false)` once the
    /// stream has closed or the reader is exhausted.
    pub fn poll<R: Read>(&mut self, reader: &mut R) -> Result<bool, CodecError> {
        if self.finished {
            return Ok(false);
        }
        let mut buf = [0u8; CHUNK];
        let n = loop {
            match reader.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if n == 0 {
            self.finish()?;
            return Ok(false);
        }
        self.feed(&buf[..n])?;
        Ok(!self.finished)
    }

    /// Push raw bytes into the tokenizer.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        for &b in bytes {
            if self.finished {
                break;
            }
            match (self.state, b) {
                (State::Text, b'<') => {
                    let text = std::mem::take(&mut self.pending);
                    self.handle_text(&text)?;
                    self.state = State::Tag;
                    self.token_start = self.offset;
                }
                (State::Tag, b'>') => {
                    let tag = std::mem::take(&mut self.pending);
                    self.handle_tag(&tag)?;
                    self.state = State::Text;
                    self.token_start = self.offset + 1;
                }
                (State::Tag, b'<') => return Err(self.malformed("'<' inside a tag")),
                _ => self.pending.push(b),
            }
            self.offset += 1;
        }
        Ok(())
    }

    /// Signal end of input. Fails if a tag or element is left open.
    pub fn finish(&mut self) -> Result<(), CodecError> {
        if self.state == State::Tag {
            return Err(self.malformed("input ends inside a tag"));
        }
        let text = std::mem::take(&mut self.pending);
        self.handle_text(&text)?;
        if !self.stack.is_empty() {
            let open = self.stack.last().map(Frame::tag).unwrap_or("atlas");
            return Err(self.malformed(&format!("input ends with <{open}> still open")));
        }
        Ok(())
    }

    fn malformed(&self, reason: &str) -> CodecError {
        CodecError::MalformedEncoding {
            offset: self.token_start,
            reason: reason.to_string(),
        }
    }

    fn handle_text(&mut self, raw: &[u8]) -> Result<(), CodecError> {
        if raw.is_empty() {
            return Ok(());
        }
        let text = std::str::from_utf8(raw).map_err(|_| self.malformed("invalid UTF-8"))?;
        if matches!(self.stack.last(), Some(Frame::Scalar { .. })) {
            let decoded = unescape(text).map_err(|reason| self.malformed(&reason))?;
            if let Some(Frame::Scalar { text: buf, .. }) = self.stack.last_mut() {
                buf.push_str(&decoded);
            }
            return Ok(());
        }
        if text.trim_start_matches('\u{feff}').trim().is_empty() {
            Ok(())
        } else {
            Err(self.malformed("unexpected character data"))
        }
    }

    fn handle_tag(&mut self, raw: &[u8]) -> Result<(), CodecError> {
        let body = std::str::from_utf8(raw).map_err(|_| self.malformed("invalid UTF-8"))?;
        if body.starts_with('?') || body.starts_with('!') {
            return Ok(());
        }
        let tag = parse_tag(body).map_err(|reason| self.malformed(&reason))?;
        if tag.closing {
            self.close(tag.name)
        } else {
            self.open(tag)
        }
    }

    fn open(&mut self, tag: Tag<'_>) -> Result<(), CodecError> {
        if self.finished {
            return Err(self.malformed("content after the end of the stream"));
        }
        if !self.started {
            if tag.name != "atlas" {
                return Err(self.malformed(&format!("expected <atlas>, found <{}>", tag.name)));
            }
            self.started = true;
            self.bridge.stream_begin();
            if tag.self_closing {
                self.bridge.stream_end();
                self.finished = true;
            } else {
                self.stack.push(Frame::Stream);
            }
            return Ok(());
        }
        if self.stack.len() >= MAX_DEPTH {
            return Err(self.malformed("nesting too deep"));
        }

        let name = match self.stack.last() {
            Some(Frame::Map) => match tag.item_name {
                Some(name) => Some(name),
                None => {
                    return Err(self.malformed(&format!("<{}> inside a map needs a name", tag.name)))
                }
            },
            Some(Frame::List) | Some(Frame::Stream) => None,
            Some(Frame::Scalar { .. }) => {
                return Err(self.malformed(&format!("<{}> nested in a scalar", tag.name)))
            }
            None => return Err(self.malformed("content after the end of the stream")),
        };

        match tag.name {
            "map" => {
                self.bridge.map_begin(name.as_deref());
                if tag.self_closing {
                    self.bridge.map_end();
                } else {
                    self.stack.push(Frame::Map);
                }
            }
            "list" => {
                self.bridge.list_begin(name.as_deref());
                if tag.self_closing {
                    self.bridge.list_end();
                } else {
                    self.stack.push(Frame::List);
                }
            }
            "int" | "float" | "string" | "none" => {
                let kind = match tag.name {
                    "int" => ElementKind::Int,
                    "float" => ElementKind::Float,
                    "string" => ElementKind::String,
                    _ => ElementKind::None,
                };
                let frame = Frame::Scalar {
                    kind,
                    name,
                    text: String::new(),
                };
                if tag.self_closing {
                    self.emit_scalar(frame)?;
                } else {
                    self.stack.push(frame);
                }
            }
            other => return Err(self.malformed(&format!("unknown tag <{other}>"))),
        }
        Ok(())
    }

    fn close(&mut self, tag_name: &str) -> Result<(), CodecError> {
        let Some(frame) = self.stack.pop() else {
            return Err(self.malformed(&format!("unmatched </{tag_name}>")));
        };
        if frame.tag() != tag_name {
            return Err(self.malformed(&format!(
                "</{tag_name}> closes <{}>",
                frame.tag()
            )));
        }
        match frame {
            Frame::Stream => {
                self.bridge.stream_end();
                self.finished = true;
            }
            Frame::Map => self.bridge.map_end(),
            Frame::List => self.bridge.list_end(),
            scalar @ Frame::Scalar { .. } => self.emit_scalar(scalar)?,
        }
        Ok(())
    }

    fn emit_scalar(&mut self, frame: Frame) -> Result<(), CodecError> {
        let Frame::Scalar { kind, name, text } = frame else {
            return Ok(());
        };
        let value = match kind {
            ElementKind::Int => text
                .trim()
                .parse::<i64>()
                .map(Element::Int)
                .map_err(|_| self.malformed(&format!("bad int {text:?}")))?,
            ElementKind::Float => text
                .trim()
                .parse::<f64>()
                .map(Element::Float)
                .map_err(|_| self.malformed(&format!("bad float {text:?}")))?,
            ElementKind::String => Element::String(text),
            _ => {
                if !text.trim().is_empty() {
                    return Err(self.malformed("<none> must be empty"));
                }
                Element::None
            }
        };
        self.bridge.scalar(name.as_deref(), value);
        Ok(())
    }
}

fn parse_tag(body: &str) -> Result<Tag<'_>, String> {
    let (closing, rest) = match body.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, body),
    };
    let (self_closing, rest) = match rest.strip_suffix('/') {
        Some(rest) => (true, rest),
        None => (false, rest),
    };
    let rest = rest.trim_end();
    let name_end = rest
        .find(|c: char| c.is_ascii_whitespace())
        .unwrap_or(rest.len());
    let name = &rest[..name_end];
    if name.is_empty() {
        return Err("empty tag".to_string());
    }
    if closing && (self_closing || !rest[name_end..].trim().is_empty()) {
        return Err(format!("malformed closing tag </{name}>"));
    }

    let mut item_name = None;
    let mut attrs = rest[name_end..].trim_start();
    while !attrs.is_empty() {
        let eq = attrs
            .find('=')
            .ok_or_else(|| format!("attribute without value in <{name}>"))?;
        let key = attrs[..eq].trim();
        let after = attrs[eq + 1..].trim_start();
        let quote = after
            .chars()
            .next()
            .filter(|c| *c == '"' || *c == '\'')
            .ok_or_else(|| format!("unquoted attribute {key:?} in <{name}>"))?;
        let close = after[1..]
            .find(quote)
            .ok_or_else(|| format!("unterminated attribute {key:?} in <{name}>"))?;
        let value = unescape(&after[1..1 + close])?;
        if key == "name" {
            item_name = Some(value);
        }
        attrs = after[close + 2..].trim_start();
    }

    Ok(Tag {
        name,
        closing,
        self_closing,
        item_name,
    })
}

fn unescape(text: &str) -> Result<String, String> {
    if !text.contains('&') {
        return Ok(text.to_string());
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        let semi = tail
            .find(';')
            .ok_or_else(|| "unterminated entity".to_string())?;
        let entity = &tail[..semi];
        let ch = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
                    .ok_or_else(|| format!("unknown entity &{entity};"))?
            }
        };
        out.push(ch);
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
