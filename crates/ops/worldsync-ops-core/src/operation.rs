//! Operations exchanged with the remote world.
//!
//! On the wire an operation is a map element:
//!   { "objtype": "op", "parent": "create", "serialno": 12, "refno": 0,
//!     "from": "acc1", "to": "42", "args": [ { ... } ] }
//!
//! The serial number tags an outgoing request; responses echo it back as
//! their reference number.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use worldsync_element_core::{query, Element, ListType, MapType};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpKind {
    Create,
    Get,
    Set,
    Info,
    Error,
    /// Any operation this crate does not interpret.
    Other(String),
}

impl OpKind {
    pub fn as_str(&self) -> &str {
        match self {
            OpKind::Create => "create",
            OpKind::Get => "get",
            OpKind::Set => "set",
            OpKind::Info => "info",
            OpKind::Error => "error",
            OpKind::Other(name) => name,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "create" => OpKind::Create,
            "get" => OpKind::Get,
            "set" => OpKind::Set,
            "info" => OpKind::Info,
            "error" => OpKind::Error,
            other => OpKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OpKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OpKind {
    fn deserialize<D>(deserializer: D) -> Result<OpKind, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Err(de::Error::custom("empty operation kind"));
        }
        Ok(OpKind::from_name(&s))
    }
}

/// Errors raised when an element does not describe an operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OperationError {
    #[error("operation element must be a map, found {0}")]
    NotAMap(&'static str),
    #[error("element has objtype {0:?}, expected \"op\"")]
    NotAnOperation(String),
    #[error("operation element has no parent kind")]
    MissingParent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OpKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serialno: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refno: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default)]
    pub args: ListType,
}

impl Operation {
    pub fn new(kind: OpKind) -> Self {
        Self {
            kind,
            serialno: None,
            refno: None,
            from: None,
            to: None,
            args: ListType::new(),
        }
    }

    /// Create an entity described by `entity`.
    pub fn create(entity: MapType) -> Self {
        Self::new(OpKind::Create).with_arg(Element::Map(entity))
    }

    /// Request the current state of entity `id`.
    pub fn get(id: impl Into<String>) -> Self {
        let mut arg = MapType::new();
        arg.insert("id".into(), Element::String(id.into()));
        Self::new(OpKind::Get).with_arg(Element::Map(arg))
    }

    /// Set `attrs` on entity `id`.
    pub fn set(id: impl Into<String>, mut attrs: MapType) -> Self {
        let id = id.into();
        attrs.insert("id".into(), Element::String(id.clone()));
        Self::new(OpKind::Set).with_to(id).with_arg(Element::Map(attrs))
    }

    /// Successful reply to the request with serial `refno`.
    pub fn info(refno: i64, entity: MapType) -> Self {
        Self::new(OpKind::Info)
            .with_refno(refno)
            .with_arg(Element::Map(entity))
    }

    /// Failure reply to the request with serial `refno`.
    pub fn error(refno: i64, message: impl Into<String>) -> Self {
        let mut arg = MapType::new();
        arg.insert("message".into(), Element::String(message.into()));
        Self::new(OpKind::Error)
            .with_refno(refno)
            .with_arg(Element::Map(arg))
    }

    pub fn with_serialno(mut self, serialno: i64) -> Self {
        self.serialno = Some(serialno);
        self
    }

    pub fn with_refno(mut self, refno: i64) -> Self {
        self.refno = Some(refno);
        self
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn with_arg(mut self, arg: Element) -> Self {
        self.args.push(arg);
        self
    }

    /// First argument, when it is a map.
    pub fn first_arg(&self) -> Option<&MapType> {
        self.args.first().and_then(Element::as_map)
    }

    /// Message carried by an error reply.
    pub fn error_message(&self) -> Option<&str> {
        self.first_arg()
            .and_then(|arg| query::get::<&str>(arg, "message"))
    }

    pub fn to_element(&self) -> Element {
        let mut map = MapType::new();
        map.insert("objtype".into(), Element::from("op"));
        map.insert("parent".into(), Element::from(self.kind.as_str()));
        if let Some(serialno) = self.serialno {
            map.insert("serialno".into(), Element::Int(serialno));
        }
        if let Some(refno) = self.refno {
            map.insert("refno".into(), Element::Int(refno));
        }
        if let Some(from) = &self.from {
            map.insert("from".into(), Element::from(from.as_str()));
        }
        if let Some(to) = &self.to {
            map.insert("to".into(), Element::from(to.as_str()));
        }
        map.insert("args".into(), Element::List(self.args.clone()));
        Element::Map(map)
    }

    pub fn from_element(element: &Element) -> Result<Self, OperationError> {
        let map = element
            .as_map()
            .ok_or_else(|| OperationError::NotAMap(element.kind().as_str()))?;
        if let Some(objtype) = map.get("objtype") {
            if objtype.as_str() != Some("op") {
                let found = objtype
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| objtype.kind().as_str().to_string());
                return Err(OperationError::NotAnOperation(found));
            }
        }
        let kind = query::get::<&str>(map, "parent")
            .filter(|p| !p.is_empty())
            .map(OpKind::from_name)
            .ok_or(OperationError::MissingParent)?;

        let mut op = Operation::new(kind);
        // Serial 0 is the wire's "unset".
        op.serialno = query::get::<i64>(map, "serialno").filter(|s| *s != 0);
        op.refno = query::get::<i64>(map, "refno").filter(|r| *r != 0);
        query::find_in::<&str, _>(map, "from", |from| op.from = Some(from.to_string()));
        query::find_in::<&str, _>(map, "to", |to| op.to = Some(to.to_string()));
        query::find_in::<&ListType, _>(map, "args", |args| op.args = args.clone());
        Ok(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_mapping_round_trips() {
        let mut entity = MapType::new();
        entity.insert("name".into(), Element::from("oak"));
        let op = Operation::create(entity)
            .with_serialno(7)
            .with_from("acc")
            .with_to("world");
        assert_eq!(Operation::from_element(&op.to_element()).unwrap(), op);
    }

    #[test]
    fn zero_serial_means_unset() {
        let mut map = MapType::new();
        map.insert("parent".into(), Element::from("info"));
        map.insert("serialno".into(), Element::Int(0));
        map.insert("refno".into(), Element::Int(3));
        let op = Operation::from_element(&Element::Map(map)).unwrap();
        assert_eq!(op.kind, OpKind::Info);
        assert_eq!(op.serialno, None);
        assert_eq!(op.refno, Some(3));
    }

    #[test]
    fn rejects_non_operations() {
        assert_eq!(
            Operation::from_element(&Element::Int(1)),
            Err(OperationError::NotAMap("int"))
        );
        let mut map = MapType::new();
        map.insert("objtype".into(), Element::from("obj"));
        map.insert("parent".into(), Element::from("thing"));
        assert_eq!(
            Operation::from_element(&Element::Map(map)),
            Err(OperationError::NotAnOperation("obj".into()))
        );
        assert_eq!(
            Operation::from_element(&Element::map()),
            Err(OperationError::MissingParent)
        );
    }

    #[test]
    fn unknown_kinds_survive() {
        assert_eq!(OpKind::from_name("sight"), OpKind::Other("sight".into()));
        assert_eq!(OpKind::from_name("sight").as_str(), "sight");
        assert_eq!(OpKind::from_name("set"), OpKind::Set);
        assert_eq!(OpKind::from_name("look"), OpKind::Other("look".into()));
        assert_eq!(OpKind::Other("look".into()).to_string(), "look");
    }

    #[test]
    fn json_form_round_trips() {
        let mut entity = MapType::new();
        entity.insert("name".into(), Element::from("oak"));
        let op = Operation::info(9, entity).with_from("world");
        let text = serde_json::to_string(&op).unwrap();
        assert!(text.starts_with(r#"{"kind":"info","#), "{text}");
        assert!(!text.contains("serialno"));
        assert_eq!(serde_json::from_str::<Operation>(&text).unwrap(), op);

        let sight: Operation = serde_json::from_str(r#"{"kind": "sight"}"#).unwrap();
        assert_eq!(sight.kind, OpKind::Other("sight".into()));
        assert!(sight.args.is_empty());
    }

    #[test]
    fn json_form_rejects_empty_kind() {
        let err = serde_json::from_str::<Operation>(r#"{"kind": ""}"#).unwrap_err();
        assert!(err.to_string().contains("empty operation kind"), "{err}");
    }

    #[test]
    fn error_reply_exposes_message() {
        let op = Operation::error(4, "no such entity");
        assert_eq!(op.error_message(), Some("no such entity"));
        assert_eq!(op.refno, Some(4));
    }
}
