//! Bundle import.
//!
//! Entities are created parent first: an entity whose `loc` names another
//! entity of the bundle waits in a queue keyed by that parent's local id and
//! is only sent once the parent's create reply reveals its server id.
//! Attributes that point at other entities (`{"$eid": "<local id>"}`) are
//! withheld from the creates and set once every entity exists. Minds go last.
//!
//! Everything is driven by replies; no call here blocks.

use std::path::Path;
use std::sync::{Arc, Weak};

use hashbrown::HashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use worldsync_element_core::{query, Element, ListType, MapType};
use worldsync_ops_core::{Correlator, OpKind, Operation, Transport};

use crate::{load_from_file, BundleError, ImportConfig};

/// Key of the single-entry map that marks an entity reference.
pub const REFERENCE_KEY: &str = "$eid";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub entities_total: usize,
    pub entities_created: usize,
    pub entities_failed: usize,
    /// Never sent: an ancestor failed, or the parent chain loops.
    pub entities_skipped: usize,
    pub references_resolved: usize,
    pub references_failed: usize,
    pub rules_total: usize,
    pub rules_done: usize,
    pub rules_failed: usize,
    pub minds_total: usize,
    pub minds_done: usize,
    pub minds_failed: usize,
}

impl ImportStats {
    pub fn failures(&self) -> usize {
        self.entities_failed
            + self.entities_skipped
            + self.references_failed
            + self.rules_failed
            + self.minds_failed
    }
}

type ProgressFn = Box<dyn FnMut(&ImportStats) + Send>;
type CompleteFn = Box<dyn FnOnce(&ImportStats) + Send>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Entities,
    References,
    Minds,
    Done,
}

struct Record {
    /// Sent with the create.
    attrs: MapType,
    /// Withheld until every entity exists.
    references: MapType,
}

#[derive(Clone, Debug)]
enum Target {
    Entity(String),
    References { local: String, count: usize },
    Rule,
    Mind(String),
}

struct Request {
    target: Target,
    op: Operation,
}

enum Outcome {
    Succeeded(Option<String>),
    Failed,
}

struct State {
    phase: Phase,
    /// Local ids in bundle order.
    order: Vec<String>,
    records: HashMap<String, Record>,
    /// Root entities with the `loc` they keep.
    roots: Vec<(String, Option<String>)>,
    /// Children keyed by their parent's local id.
    waiting: HashMap<String, Vec<String>>,
    server_ids: HashMap<String, String>,
    rules: Vec<MapType>,
    minds: Vec<MapType>,
    outstanding: usize,
    stats: ImportStats,
    on_complete: Option<CompleteFn>,
}

struct Inner<T> {
    correlator: Weak<Correlator<T>>,
    config: ImportConfig,
    state: Mutex<State>,
    on_progress: Mutex<Option<ProgressFn>>,
}

/// Imports one bundle through a [`Correlator`].
///
/// Continuations only hold a weak handle on the correlator, so dropping the
/// correlator abandons whatever is still in flight.
pub struct EntityImporter<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport + 'static> EntityImporter<T> {
    pub fn new(
        correlator: &Arc<Correlator<T>>,
        bundle: &Element,
        config: ImportConfig,
    ) -> Result<Self, BundleError> {
        let root = bundle
            .as_map()
            .filter(|m| !m.is_empty())
            .ok_or(BundleError::NotABundle {
                found: bundle.kind().as_str(),
            })?;
        let state = State::parse(root, &config);
        Ok(Self {
            inner: Arc::new(Inner {
                correlator: Arc::downgrade(correlator),
                config,
                state: Mutex::new(state),
                on_progress: Mutex::new(None),
            }),
        })
    }

    pub fn from_file(
        correlator: &Arc<Correlator<T>>,
        path: impl AsRef<Path>,
        config: ImportConfig,
    ) -> Result<Self, BundleError> {
        let bundle = load_from_file(path)?;
        Self::new(correlator, &bundle, config)
    }

    /// Called after every reply with the running totals.
    pub fn on_progress<F>(self, f: F) -> Self
    where
        F: FnMut(&ImportStats) + Send + 'static,
    {
        *self.inner.on_progress.lock() = Some(Box::new(f));
        self
    }

    /// Called once, when nothing is left outstanding.
    pub fn on_complete<F>(self, f: F) -> Self
    where
        F: FnOnce(&ImportStats) + Send + 'static,
    {
        self.inner.state.lock().on_complete = Some(Box::new(f));
        self
    }

    /// Send the root entities and the rules. Later calls do nothing.
    pub fn start(&self) {
        self.inner.step(false, |state| {
            if state.phase != Phase::Idle {
                warn!("import already started");
                return Vec::new();
            }
            state.phase = Phase::Entities;
            let roots = std::mem::take(&mut state.roots);
            let mut requests: Vec<Request> = roots
                .into_iter()
                .filter_map(|(local, loc)| {
                    let loc = self.inner.config.root_location.clone().or(loc);
                    state.create_request(&local, loc)
                })
                .collect();
            requests.extend(state.rule_requests(&self.inner.config));
            requests
        });
    }

    pub fn stats(&self) -> ImportStats {
        self.inner.state.lock().stats.clone()
    }

    pub fn is_complete(&self) -> bool {
        self.inner.state.lock().phase == Phase::Done
    }

    /// Server id assigned to the bundle entity `local`, once created.
    pub fn server_id(&self, local: &str) -> Option<String> {
        self.inner.state.lock().server_ids.get(local).cloned()
    }
}

impl<T: Transport + 'static> Inner<T> {
    /// Mutate the state, queue follow-up work, then report and send with the
    /// lock released so synchronous replies can re-enter.
    fn step<F>(self: &Arc<Self>, report: bool, f: F)
    where
        F: FnOnce(&mut State) -> Vec<Request>,
    {
        let (requests, stats, complete) = {
            let mut state = self.state.lock();
            let mut requests = f(&mut state);
            state.outstanding += requests.len();
            if state.outstanding == 0 {
                requests.extend(state.advance());
            }
            let complete = if state.phase == Phase::Done {
                state.on_complete.take()
            } else {
                None
            };
            (requests, state.stats.clone(), complete)
        };

        if report {
            if let Some(progress) = self.on_progress.lock().as_mut() {
                progress(&stats);
            }
        }
        if let Some(complete) = complete {
            info!(
                "import finished: {} of {} entities created, {} failures",
                stats.entities_created,
                stats.entities_total,
                stats.failures()
            );
            complete(&stats);
        }
        for request in requests {
            self.send(request);
        }
    }

    fn send(self: &Arc<Self>, request: Request) {
        let Request { target, op } = request;
        let Some(correlator) = self.correlator.upgrade() else {
            warn!("connection gone, abandoning {target:?}");
            self.settle(&target, Outcome::Failed);
            return;
        };
        let this = self.clone();
        let awaited = target.clone();
        let sent = correlator.send_and_await(op, move |reply| this.on_reply(&awaited, reply));
        if let Err(err) = sent {
            warn!("failed to send import request for {target:?}: {err}");
            self.settle(&target, Outcome::Failed);
        }
    }

    fn on_reply(self: &Arc<Self>, target: &Target, reply: &Operation) {
        let outcome = match reply.kind {
            OpKind::Info => Outcome::Succeeded(reply.first_arg().and_then(entity_id)),
            OpKind::Error => {
                warn!(
                    "import of {target:?} rejected: {}",
                    reply.error_message().unwrap_or("no reason given")
                );
                Outcome::Failed
            }
            _ => {
                debug!("ignoring {} reply for {target:?}", reply.kind);
                return;
            }
        };
        // One answer settles a request; drop the registration so a repeated
        // reply is not counted twice.
        if let (Some(refno), Some(correlator)) = (reply.refno, self.correlator.upgrade()) {
            correlator.forget(refno);
        }
        self.settle(target, outcome);
    }

    fn settle(self: &Arc<Self>, target: &Target, outcome: Outcome) {
        self.step(true, |state| {
            state.outstanding = state.outstanding.saturating_sub(1);
            let ok = matches!(outcome, Outcome::Succeeded(_));
            match target {
                Target::Entity(local) => match outcome {
                    Outcome::Succeeded(Some(server_id)) => state.created(local, server_id),
                    Outcome::Succeeded(None) => {
                        warn!("create reply for entity {local} carries no id");
                        state.failed(local);
                        Vec::new()
                    }
                    Outcome::Failed => {
                        state.failed(local);
                        Vec::new()
                    }
                },
                Target::References { local, count } => {
                    if ok {
                        state.stats.references_resolved += count;
                    } else {
                        warn!("could not set references on entity {local}");
                        state.stats.references_failed += count;
                    }
                    Vec::new()
                }
                Target::Rule => {
                    if ok {
                        state.stats.rules_done += 1;
                    } else {
                        state.stats.rules_failed += 1;
                    }
                    Vec::new()
                }
                Target::Mind(_) => {
                    if ok {
                        state.stats.minds_done += 1;
                    } else {
                        state.stats.minds_failed += 1;
                    }
                    Vec::new()
                }
            }
        });
    }
}

impl State {
    fn parse(root: &MapType, config: &ImportConfig) -> Self {
        let mut state = State {
            phase: Phase::Idle,
            order: Vec::new(),
            records: HashMap::new(),
            roots: Vec::new(),
            waiting: HashMap::new(),
            server_ids: HashMap::new(),
            rules: Vec::new(),
            minds: Vec::new(),
            outstanding: 0,
            stats: ImportStats::default(),
            on_complete: None,
        };

        let mut parents = Vec::new();
        let entities = query::get::<&ListType>(root, "entities").map_or(&[][..], Vec::as_slice);
        for (index, entity) in entities.iter().enumerate() {
            state.stats.entities_total += 1;
            let Some(map) = entity.as_map() else {
                warn!("entity #{index} is a {}, not a map; skipping", entity.kind().as_str());
                state.stats.entities_failed += 1;
                continue;
            };
            let Some(local) = entity_id(map) else {
                warn!("entity #{index} has no id; skipping");
                state.stats.entities_failed += 1;
                continue;
            };
            if state.records.contains_key(&local) {
                warn!("duplicate entity id {local}; skipping");
                state.stats.entities_failed += 1;
                continue;
            }

            let mut record = Record {
                attrs: MapType::new(),
                references: MapType::new(),
            };
            for (key, value) in map {
                match key.as_str() {
                    "id" | "loc" | "contains" => {}
                    _ if config.resolve_references && holds_reference(value) => {
                        record.references.insert(key.clone(), value.clone());
                    }
                    _ => {
                        record.attrs.insert(key.clone(), value.clone());
                    }
                }
            }
            parents.push(map.get("loc").and_then(id_string));
            state.order.push(local.clone());
            state.records.insert(local, record);
        }

        for (local, parent) in state.order.iter().zip(parents) {
            match parent {
                Some(parent) if state.records.contains_key(&parent) => {
                    state.waiting.entry(parent).or_default().push(local.clone());
                }
                loc => state.roots.push((local.clone(), loc)),
            }
        }

        if config.import_rules {
            state.rules = maps_in(root, "rules");
            state.stats.rules_total = state.rules.len();
        }
        if config.import_minds {
            state.minds = maps_in(root, "minds");
            state.stats.minds_total = state.minds.len();
        }
        state
    }

    fn create_request(&self, local: &str, loc: Option<String>) -> Option<Request> {
        let record = self.records.get(local)?;
        let mut attrs = record.attrs.clone();
        if let Some(loc) = loc {
            attrs.insert("loc".into(), Element::String(loc));
        }
        Some(Request {
            target: Target::Entity(local.to_string()),
            op: Operation::create(attrs),
        })
    }

    fn rule_requests(&mut self, config: &ImportConfig) -> Vec<Request> {
        let rules = std::mem::take(&mut self.rules);
        if rules.is_empty() {
            return Vec::new();
        }
        let Some(account) = &config.account_id else {
            warn!("no account configured, {} rules not imported", rules.len());
            self.stats.rules_failed += rules.len();
            return Vec::new();
        };
        rules
            .into_iter()
            .map(|rule| Request {
                target: Target::Rule,
                op: Operation::new(OpKind::Set)
                    .with_to(account.clone())
                    .with_arg(Element::Map(rule)),
            })
            .collect()
    }

    /// Record a created entity and release its children.
    fn created(&mut self, local: &str, server_id: String) -> Vec<Request> {
        debug!("entity {local} created as {server_id}");
        self.stats.entities_created += 1;
        self.server_ids.insert(local.to_string(), server_id.clone());
        let children = self.waiting.remove(local).unwrap_or_default();
        children
            .iter()
            .filter_map(|child| self.create_request(child, Some(server_id.clone())))
            .collect()
    }

    fn failed(&mut self, local: &str) {
        self.stats.entities_failed += 1;
        let mut skipped = 0;
        let mut stack = vec![local.to_string()];
        while let Some(parent) = stack.pop() {
            if let Some(children) = self.waiting.remove(&parent) {
                skipped += children.len();
                stack.extend(children);
            }
        }
        if skipped > 0 {
            warn!("entity {local} failed, skipping {skipped} descendants");
        }
        self.stats.entities_skipped += skipped;
    }

    /// Move to the next phase that has work, returning that work.
    fn advance(&mut self) -> Vec<Request> {
        loop {
            let requests = match self.phase {
                Phase::Idle | Phase::Done => return Vec::new(),
                Phase::Entities => {
                    let stranded: usize = self.waiting.drain().map(|(_, c)| c.len()).sum();
                    if stranded > 0 {
                        warn!("{stranded} entities have cyclic parents; skipping");
                        self.stats.entities_skipped += stranded;
                    }
                    self.phase = Phase::References;
                    self.reference_requests()
                }
                Phase::References => {
                    self.phase = Phase::Minds;
                    self.mind_requests()
                }
                Phase::Minds => {
                    self.phase = Phase::Done;
                    return Vec::new();
                }
            };
            if !requests.is_empty() {
                self.outstanding += requests.len();
                return requests;
            }
        }
    }

    fn reference_requests(&mut self) -> Vec<Request> {
        let State {
            order,
            records,
            server_ids,
            stats,
            ..
        } = self;
        let mut requests = Vec::new();
        for local in order.iter() {
            let Some(record) = records.get(local) else {
                continue;
            };
            if record.references.is_empty() {
                continue;
            }
            let Some(server_id) = server_ids.get(local) else {
                stats.references_failed += record.references.len();
                continue;
            };
            let mut attrs = MapType::new();
            for (key, value) in &record.references {
                match resolve(value, server_ids) {
                    Ok(value) => {
                        attrs.insert(key.clone(), value);
                    }
                    Err(missing) => {
                        warn!("{local}.{key} refers to {missing}, which was not created");
                        stats.references_failed += 1;
                    }
                }
            }
            if !attrs.is_empty() {
                requests.push(Request {
                    target: Target::References {
                        local: local.clone(),
                        count: attrs.len(),
                    },
                    op: Operation::set(server_id.clone(), attrs),
                });
            }
        }
        requests
    }

    fn mind_requests(&mut self) -> Vec<Request> {
        let minds = std::mem::take(&mut self.minds);
        let mut requests = Vec::new();
        for mind in minds {
            let Some(local) = entity_id(&mind) else {
                warn!("mind without entity id; skipping");
                self.stats.minds_failed += 1;
                continue;
            };
            let Some(server_id) = self.server_ids.get(&local) else {
                warn!("mind for {local} has no created entity; skipping");
                self.stats.minds_failed += 1;
                continue;
            };
            let mut attrs = MapType::new();
            let mut resolved = true;
            for (key, value) in mind.iter().filter(|(k, _)| k.as_str() != "id") {
                match resolve(value, &self.server_ids) {
                    Ok(value) => {
                        attrs.insert(key.clone(), value);
                    }
                    Err(missing) => {
                        warn!("mind for {local} refers to {missing}, which was not created");
                        resolved = false;
                        break;
                    }
                }
            }
            if !resolved {
                self.stats.minds_failed += 1;
                continue;
            }
            requests.push(Request {
                target: Target::Mind(local),
                op: Operation::set(server_id.clone(), attrs),
            });
        }
        requests
    }
}

fn maps_in(root: &MapType, key: &str) -> Vec<MapType> {
    query::get::<&ListType>(root, key)
        .map(|list| list.iter().filter_map(Element::as_map).cloned().collect())
        .unwrap_or_default()
}

/// Entity ids arrive as non-empty strings or as integers.
pub(crate) fn id_string(value: &Element) -> Option<String> {
    match value {
        Element::String(s) if !s.is_empty() => Some(s.clone()),
        Element::Int(i) => Some(i.to_string()),
        _ => None,
    }
}

fn entity_id(map: &MapType) -> Option<String> {
    map.get("id").and_then(id_string)
}

/// Local id named by a reference map.
fn reference_target(value: &Element) -> Option<String> {
    let map = value.as_map()?;
    if map.len() != 1 {
        return None;
    }
    map.get(REFERENCE_KEY).and_then(id_string)
}

fn holds_reference(value: &Element) -> bool {
    if reference_target(value).is_some() {
        return true;
    }
    match value {
        Element::Map(map) => map.values().any(holds_reference),
        Element::List(list) => list.iter().any(holds_reference),
        _ => false,
    }
}

/// Replace every reference in `value` by the server id it maps to.
/// Fails with the first local id that has none.
fn resolve(value: &Element, ids: &HashMap<String, String>) -> Result<Element, String> {
    if let Some(local) = reference_target(value) {
        return ids.get(&local).cloned().map(Element::String).ok_or(local);
    }
    match value {
        Element::Map(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), resolve(v, ids)?)))
            .collect::<Result<MapType, String>>()
            .map(Element::Map),
        Element::List(list) => list
            .iter()
            .map(|v| resolve(v, ids))
            .collect::<Result<ListType, String>>()
            .map(Element::List),
        other => Ok(other.clone()),
    }
}
