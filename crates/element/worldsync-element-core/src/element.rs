//! Element: self-describing nodes of a generic attribute tree.
//! A node is a map, a list, or one of the int/float/string/none scalars.

use std::fmt;

use indexmap::IndexMap;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// Insertion-ordered attribute map.
pub type MapType = IndexMap<String, Element>;

/// Ordered element sequence.
pub type ListType = Vec<Element>;

/// Coarse tag of an [`Element`], handy for dispatch and diagnostics.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Map,
    List,
    Int,
    Float,
    String,
    None,
}

impl ElementKind {
    /// Tag name used by the text codec.
    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::Map => "map",
            ElementKind::List => "list",
            ElementKind::Int => "int",
            ElementKind::Float => "float",
            ElementKind::String => "string",
            ElementKind::None => "none",
        }
    }
}

/// A node of a generic tree. Each node owns its children.
///
/// Serialized untagged, so JSON objects, arrays, integers, floats, strings and
/// `null` map straight onto the variants. Booleans deserialize as `Int` 0/1.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Element {
    Map(MapType),
    List(ListType),
    Int(i64),
    Float(f64),
    String(String),
    #[default]
    None,
}

impl Element {
    #[inline]
    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Map(_) => ElementKind::Map,
            Element::List(_) => ElementKind::List,
            Element::Int(_) => ElementKind::Int,
            Element::Float(_) => ElementKind::Float,
            Element::String(_) => ElementKind::String,
            Element::None => ElementKind::None,
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Element::Map(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Element::List(_))
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Element::Int(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Element::Float(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Element::String(_))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Element::None)
    }

    pub fn as_map(&self) -> Option<&MapType> {
        match self {
            Element::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut MapType> {
        match self {
            Element::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListType> {
        match self {
            Element::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Element::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Element::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Element::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_map(self) -> Option<MapType> {
        match self {
            Element::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<ListType> {
        match self {
            Element::List(l) => Some(l),
            _ => None,
        }
    }

    /// Borrow the attribute `key` of a map element.
    ///
    /// `None` means the key is absent or `self` is not a map. A present key is
    /// returned whatever its type, so callers can tell "absent" from "wrong type".
    pub fn attr(&self, key: &str) -> Option<&Element> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Owned variant of [`Element::attr`].
    pub fn copy_attr(&self, key: &str) -> Option<Element> {
        self.attr(key).cloned()
    }

    /// Empty map element.
    pub fn map() -> Self {
        Element::Map(MapType::new())
    }

    /// Empty list element.
    pub fn list() -> Self {
        Element::List(ListType::new())
    }
}

struct ElementVisitor;

impl<'de> Visitor<'de> for ElementVisitor {
    type Value = Element;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map, list, number, string, boolean or null")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Element, E> {
        Ok(Element::Int(i64::from(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Element, E> {
        Ok(Element::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Element, E> {
        Ok(i64::try_from(v).map_or(Element::Float(v as f64), Element::Int))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Element, E> {
        Ok(Element::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Element, E> {
        Ok(Element::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Element, E> {
        Ok(Element::String(v))
    }

    fn visit_none<E: de::Error>(self) -> Result<Element, E> {
        Ok(Element::None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Element, E> {
        Ok(Element::None)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Element, D::Error> {
        Element::deserialize(d)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Element, A::Error> {
        let mut list = ListType::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            list.push(item);
        }
        Ok(Element::List(list))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Element, A::Error> {
        let mut map = MapType::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, Element>()? {
            map.insert(key, value);
        }
        Ok(Element::Map(map))
    }
}

impl<'de> Deserialize<'de> for Element {
    fn deserialize<D>(deserializer: D) -> Result<Element, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ElementVisitor)
    }
}

impl From<MapType> for Element {
    fn from(v: MapType) -> Self {
        Element::Map(v)
    }
}

impl From<ListType> for Element {
    fn from(v: ListType) -> Self {
        Element::List(v)
    }
}

impl From<i64> for Element {
    fn from(v: i64) -> Self {
        Element::Int(v)
    }
}

impl From<i32> for Element {
    fn from(v: i32) -> Self {
        Element::Int(v.into())
    }
}

impl From<f64> for Element {
    fn from(v: f64) -> Self {
        Element::Float(v)
    }
}

impl From<String> for Element {
    fn from(v: String) -> Self {
        Element::String(v)
    }
}

impl From<&str> for Element {
    fn from(v: &str) -> Self {
        Element::String(v.to_string())
    }
}

impl FromIterator<(String, Element)> for Element {
    fn from_iter<I: IntoIterator<Item = (String, Element)>>(iter: I) -> Self {
        Element::Map(iter.into_iter().collect())
    }
}

impl FromIterator<Element> for Element {
    fn from_iter<I: IntoIterator<Item = Element>>(iter: I) -> Self {
        Element::List(iter.into_iter().collect())
    }
}
