//! Textual element codec.
//!
//! The encoding is a small tagged-tree dialect:
//!
//! ```text
//! <atlas>
//!   <map>
//!     <map name="meta"><string name="name">Castle</string></map>
//!     <list name="entities"><map><int name="x">5</int></map></list>
//!     <float name="mass">1.5</float>
//!     <none name="nothing"/>
//!   </map>
//! </atlas>
//! ```
//!
//! Decoding is push-based: a [`Decoder`] tokenizes whatever bytes it is fed
//! and announces structural events to a [`Bridge`]. [`ElementBuilder`] is the
//! bridge that assembles those events into [`Element`] trees; the
//! [`decode`]/[`decode_reader`] adapters pump a source through it and keep the
//! last complete top-level element.

mod builder;
mod decoder;
mod encoder;

use std::io::Read;

use thiserror::Error;

use crate::Element;

pub use builder::ElementBuilder;
pub use decoder::{Decoder, MAX_DEPTH};
pub use encoder::{encode, encode_pretty, write_element};

/// Errors raised while decoding the text encoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("read error while decoding: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed encoding at byte {offset}: {reason}")]
    MalformedEncoding { offset: usize, reason: String },
}

/// Receiver of decode events.
///
/// `name` is the attribute name when the item sits inside a map and `None`
/// inside lists or directly under the stream.
pub trait Bridge {
    fn stream_begin(&mut self) {}
    fn map_begin(&mut self, name: Option<&str>);
    fn map_end(&mut self);
    fn list_begin(&mut self, name: Option<&str>);
    fn list_end(&mut self);
    fn scalar(&mut self, name: Option<&str>, value: Element);
    fn stream_end(&mut self) {}
}

/// Decode `text` and return the last top-level element it contains.
///
/// `Ok(None)` means the input held no complete element; callers treat that as
/// a failed decode rather than as an empty tree.
pub fn decode(text: &str) -> Result<Option<Element>, CodecError> {
    decode_reader(text.as_bytes())
}

/// Pump `reader` through a [`Decoder`] until the stream closes or the reader
/// is exhausted, then return the last top-level element.
pub fn decode_reader<R: Read>(mut reader: R) -> Result<Option<Element>, CodecError> {
    let mut decoder = Decoder::new(ElementBuilder::new());
    while decoder.poll(&mut reader)? {}
    Ok(decoder.into_bridge().take_last_object())
}
