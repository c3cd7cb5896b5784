//! worldsync-element-core: generic element trees, typed queries and the textual codec.

pub mod codec;
pub mod element;
pub mod json;
pub mod query;

pub use codec::{decode, decode_reader, encode, encode_pretty, CodecError, Decoder, ElementBuilder};
pub use element::{Element, ElementKind, ListType, MapType};
pub use query::{find, find_in, get, FromElement};
