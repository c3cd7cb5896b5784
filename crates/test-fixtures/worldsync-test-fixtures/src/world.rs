//! In-memory world answering create/get/set operations.
//!
//! Replies are queued rather than delivered from inside `send`, the way a
//! real connection hands them over later. Tests pump them with
//! [`FakeWorld::deliver`].

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use parking_lot::Mutex;
use worldsync_element_core::{query, Element, MapType};
use worldsync_ops_core::{Correlator, OpKind, Operation, Transport, TransportError};

/// Id of the entity everything else lives in.
pub const WORLD_ID: &str = "0";

#[derive(Default)]
struct WorldState {
    entities: IndexMap<String, MapType>,
    next_id: u64,
    replies: VecDeque<Operation>,
    received: Vec<Operation>,
    rejected_names: HashSet<String>,
    account_updates: Vec<(String, MapType)>,
    offline: bool,
}

pub struct FakeWorld {
    state: Mutex<WorldState>,
}

impl Default for FakeWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeWorld {
    pub fn new() -> Self {
        let mut world = MapType::new();
        world.insert("id".into(), WORLD_ID.into());
        world.insert("name".into(), "world".into());
        world.insert("contains".into(), Element::list());
        let mut state = WorldState {
            next_id: 100,
            ..WorldState::default()
        };
        state.entities.insert(WORLD_ID.to_string(), world);
        Self {
            state: Mutex::new(state),
        }
    }

    /// Answer creates of entities called `name` with an error.
    pub fn reject_entities_named(&self, name: &str) {
        self.state.lock().rejected_names.insert(name.to_string());
    }

    /// Make every later `send` fail.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Add an entity directly, without any operation. Returns its id.
    pub fn insert_entity(&self, loc: &str, attrs: MapType) -> String {
        let mut state = self.state.lock();
        match state.create(Some(loc), attrs) {
            Ok(entity) => query::get::<&str>(&entity, "id")
                .unwrap_or_default()
                .to_string(),
            Err(msg) => panic!("cannot seed entity: {msg}"),
        }
    }

    pub fn entity(&self, id: &str) -> Option<MapType> {
        self.state.lock().entities.get(id).cloned()
    }

    /// First entity whose `name` attribute equals `name`.
    pub fn entity_named(&self, name: &str) -> Option<MapType> {
        self.state
            .lock()
            .entities
            .values()
            .find(|e| query::get::<&str>(e, "name") == Some(name))
            .cloned()
    }

    /// Number of entities, the world entity included.
    pub fn entity_count(&self) -> usize {
        self.state.lock().entities.len()
    }

    /// Ids listed in the `contains` attribute of `id`.
    pub fn children(&self, id: &str) -> Vec<String> {
        self.entity(id)
            .and_then(|e| e.get("contains").and_then(Element::as_list).cloned())
            .unwrap_or_default()
            .iter()
            .filter_map(|c| c.as_str().map(str::to_string))
            .collect()
    }

    /// Every operation sent so far, in order.
    pub fn received(&self) -> Vec<Operation> {
        self.state.lock().received.clone()
    }

    /// `set` operations addressed to something other than an entity.
    pub fn account_updates(&self) -> Vec<(String, MapType)> {
        self.state.lock().account_updates.clone()
    }

    pub fn queued_replies(&self) -> usize {
        self.state.lock().replies.len()
    }

    /// Hand queued replies to `correlator` until none are left, including
    /// replies to requests issued while delivering. Returns how many were
    /// delivered.
    pub fn deliver<T: Transport>(&self, correlator: &Correlator<T>) -> usize {
        let mut delivered = 0;
        loop {
            let Some(reply) = self.state.lock().replies.pop_front() else {
                return delivered;
            };
            correlator.on_operation_received(&reply);
            delivered += 1;
        }
    }

    /// Deliver only the next queued reply.
    pub fn deliver_one<T: Transport>(&self, correlator: &Correlator<T>) -> bool {
        let next = self.state.lock().replies.pop_front();
        match next {
            Some(reply) => {
                correlator.on_operation_received(&reply);
                true
            }
            None => false,
        }
    }
}

impl WorldState {
    fn create(&mut self, loc: Option<&str>, mut attrs: MapType) -> Result<MapType, String> {
        if let Some(name) = query::get::<&str>(&attrs, "name") {
            if self.rejected_names.contains(name) {
                return Err(format!("creating {name} is not allowed"));
            }
        }
        let loc = loc.unwrap_or(WORLD_ID).to_string();
        if !self.entities.contains_key(&loc) {
            return Err(format!("no such location {loc}"));
        }
        let id = self.next_id.to_string();
        self.next_id += 1;
        attrs.insert("id".into(), Element::String(id.clone()));
        attrs.insert("loc".into(), Element::String(loc.clone()));
        attrs.insert("contains".into(), Element::list());
        if let Some(Element::List(contains)) = self
            .entities
            .get_mut(&loc)
            .and_then(|parent| parent.get_mut("contains"))
        {
            contains.push(Element::String(id.clone()));
        }
        self.entities.insert(id, attrs.clone());
        Ok(attrs)
    }

    fn answer(&mut self, op: &Operation) -> Result<MapType, String> {
        let arg = op.first_arg().cloned().unwrap_or_default();
        match &op.kind {
            OpKind::Create => {
                let loc = query::get::<&str>(&arg, "loc").map(str::to_string);
                let mut attrs = arg;
                attrs.shift_remove("loc");
                self.create(loc.as_deref(), attrs)
            }
            OpKind::Get => {
                let id = query::get::<&str>(&arg, "id").unwrap_or(WORLD_ID);
                self.entities
                    .get(id)
                    .cloned()
                    .ok_or_else(|| format!("no such entity {id}"))
            }
            OpKind::Set => {
                let to = op.to.clone().ok_or("set without target")?;
                match self.entities.get_mut(&to) {
                    Some(entity) => {
                        for (key, value) in arg {
                            if key != "id" {
                                entity.insert(key, value);
                            }
                        }
                        Ok(entity.clone())
                    }
                    None => {
                        self.account_updates.push((to, arg.clone()));
                        Ok(arg)
                    }
                }
            }
            other => Err(format!("unsupported operation {other}")),
        }
    }
}

impl Transport for FakeWorld {
    fn send(&self, op: &Operation) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.offline {
            return Err(TransportError::Disconnected);
        }
        state.received.push(op.clone());
        let Some(serialno) = op.serialno else {
            return Ok(());
        };
        let reply = match state.answer(op) {
            Ok(entity) => Operation::info(serialno, entity),
            Err(msg) => Operation::error(serialno, msg),
        };
        state.replies.push_back(reply);
        Ok(())
    }
}
