//! Bundle export: walk an entity tree on the server through `contains`
//! and collect it into a bundle.

use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashSet;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;
use worldsync_element_core::{Element, ListType, MapType};
use worldsync_ops_core::{Correlator, OpKind, Operation, Transport};

use crate::import::id_string;
use crate::ExportConfig;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    pub requested: usize,
    pub entities: usize,
    pub failed: usize,
}

type CompleteFn = Box<dyn FnOnce(&Element) + Send>;

#[derive(Default)]
struct State {
    started: bool,
    outstanding: usize,
    requested: HashSet<String>,
    entities: Vec<MapType>,
    stats: ExportStats,
    bundle: Option<Element>,
    on_complete: Option<CompleteFn>,
}

struct Inner<T> {
    correlator: Weak<Correlator<T>>,
    config: ExportConfig,
    state: Mutex<State>,
}

pub struct EntityExporter<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport + 'static> EntityExporter<T> {
    pub fn new(correlator: &Arc<Correlator<T>>, config: ExportConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                correlator: Arc::downgrade(correlator),
                config,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Called once with the finished bundle.
    pub fn on_complete<F>(self, f: F) -> Self
    where
        F: FnOnce(&Element) + Send + 'static,
    {
        self.inner.state.lock().on_complete = Some(Box::new(f));
        self
    }

    /// Request `root_id` and, transitively, everything it contains.
    /// Later calls do nothing.
    pub fn start(&self, root_id: impl Into<String>) {
        let root_id = root_id.into();
        {
            let mut state = self.inner.state.lock();
            if state.started {
                warn!("export already started");
                return;
            }
            state.started = true;
            state.requested.insert(root_id.clone());
            state.stats.requested += 1;
            state.outstanding += 1;
        }
        self.inner.request(root_id);
    }

    pub fn stats(&self) -> ExportStats {
        self.inner.state.lock().stats.clone()
    }

    pub fn is_complete(&self) -> bool {
        self.inner.state.lock().bundle.is_some()
    }

    /// The exported bundle, once every request has been answered.
    pub fn bundle(&self) -> Option<Element> {
        self.inner.state.lock().bundle.clone()
    }
}

impl<T: Transport + 'static> Inner<T> {
    fn request(self: &Arc<Self>, id: String) {
        let Some(correlator) = self.correlator.upgrade() else {
            warn!("connection gone, not exporting {id}");
            self.settle(None);
            return;
        };
        let this = self.clone();
        if let Err(err) = correlator.send_and_await(Operation::get(id.clone()), move |reply| {
            this.on_reply(reply)
        }) {
            warn!("failed to request entity {id}: {err}");
            self.settle(None);
        }
    }

    fn on_reply(self: &Arc<Self>, reply: &Operation) {
        let entity = match reply.kind {
            OpKind::Info => reply.first_arg().cloned(),
            OpKind::Error => {
                warn!(
                    "export request rejected: {}",
                    reply.error_message().unwrap_or("no reason given")
                );
                None
            }
            _ => {
                debug!("ignoring {} reply during export", reply.kind);
                return;
            }
        };
        if let (Some(refno), Some(correlator)) = (reply.refno, self.correlator.upgrade()) {
            correlator.forget(refno);
        }
        self.settle(entity);
    }

    fn settle(self: &Arc<Self>, entity: Option<MapType>) {
        let (children, complete) = {
            let mut state = self.state.lock();
            state.outstanding = state.outstanding.saturating_sub(1);
            let mut children = Vec::new();
            match entity {
                Some(mut entity) => {
                    let contains = entity.shift_remove("contains");
                    if let Some(Element::List(ids)) = contains {
                        for id in ids.iter().filter_map(id_string) {
                            if state.requested.insert(id.clone()) {
                                children.push(id);
                            }
                        }
                    }
                    state.entities.push(entity);
                    state.stats.entities += 1;
                }
                None => state.stats.failed += 1,
            }
            state.stats.requested += children.len();
            state.outstanding += children.len();

            let mut complete = None;
            if state.outstanding == 0 && state.bundle.is_none() {
                let bundle = self.build(&state.entities);
                info!(
                    "export finished: {} entities, {} failures",
                    state.stats.entities, state.stats.failed
                );
                complete = state.on_complete.take().map(|f| (f, bundle.clone()));
                state.bundle = Some(bundle);
            }
            (children, complete)
        };

        if let Some((complete, bundle)) = complete {
            complete(&bundle);
        }
        for id in children {
            self.request(id);
        }
    }

    fn build(&self, entities: &[MapType]) -> Element {
        let mut meta = MapType::new();
        meta.insert("name".into(), Element::from(self.config.name.as_str()));
        if let Some(description) = &self.config.description {
            meta.insert("description".into(), Element::from(description.as_str()));
        }
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        meta.insert("timestamp".into(), Element::Int(timestamp));
        meta.insert("id".into(), Element::String(Uuid::new_v4().to_string()));

        let mut bundle = MapType::new();
        bundle.insert("meta".into(), Element::Map(meta));
        bundle.insert(
            "entities".into(),
            Element::List(entities.iter().cloned().map(Element::Map).collect::<ListType>()),
        );
        Element::Map(bundle)
    }
}
