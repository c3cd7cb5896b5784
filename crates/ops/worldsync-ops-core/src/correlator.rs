//! Request/response correlation by serial number.
//!
//! `send_and_await` registers a continuation under the request's serial
//! number; `on_operation_received` runs every continuation registered under
//! the response's reference number. A single request may be answered several
//! times (streamed results), so delivery does not consume the registration.
//! Registrations live until `forget` or `evict_idle` removes them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use log::debug;
use parking_lot::Mutex;
use thiserror::Error;

use crate::{Operation, SerialNumberGenerator, Transport, TransportError};

/// Callback run for each response to a request.
pub type Continuation = Arc<dyn Fn(&Operation) + Send + Sync>;

#[derive(Debug, Error)]
pub enum CorrelatorError {
    #[error("failed to send {kind} operation (serial {serialno:?}): {source}")]
    Send {
        kind: String,
        serialno: Option<i64>,
        #[source]
        source: TransportError,
    },
}

struct Registration {
    id: u64,
    continuation: Continuation,
    registered_at: Instant,
}

pub struct Correlator<T> {
    transport: T,
    serials: SerialNumberGenerator,
    next_registration: AtomicU64,
    pending: Mutex<HashMap<i64, Vec<Registration>>>,
}

impl<T: Transport> fmt::Debug for Correlator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correlator")
            .field("serials", &self.serials)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Correlator<T> {
    /// Correlator drawing serial numbers from the process-wide counter.
    pub fn new(transport: T) -> Self {
        Self::with_serials(transport, SerialNumberGenerator::global())
    }

    pub fn with_serials(transport: T, serials: SerialNumberGenerator) -> Self {
        Self {
            transport,
            serials,
            next_registration: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn new_serial_number(&self) -> i64 {
        self.serials.next()
    }

    /// Transmit `op` as-is, without registering anything.
    pub fn send(&self, op: &Operation) -> Result<(), CorrelatorError> {
        self.transport.send(op).map_err(|source| CorrelatorError::Send {
            kind: op.kind.to_string(),
            serialno: op.serialno,
            source,
        })
    }

    /// Send `op` and run `continuation` for every response referring to it.
    ///
    /// A serial number is assigned when `op` has none. The continuation is
    /// registered before transmission, so a transport answering synchronously
    /// is still routed. If transmission fails the registration is withdrawn.
    /// Returns the request's serial number.
    pub fn send_and_await<F>(&self, mut op: Operation, continuation: F) -> Result<i64, CorrelatorError>
    where
        F: Fn(&Operation) + Send + Sync + 'static,
    {
        let serialno = match op.serialno {
            Some(serialno) => serialno,
            None => {
                let serialno = self.serials.next();
                op.serialno = Some(serialno);
                serialno
            }
        };
        let id = self.next_registration.fetch_add(1, Ordering::Relaxed);
        self.pending
            .lock()
            .entry(serialno)
            .or_default()
            .push(Registration {
                id,
                continuation: Arc::new(continuation),
                registered_at: Instant::now(),
            });
        self.transport.await_response(serialno);

        if let Err(err) = self.send(&op) {
            self.withdraw(serialno, id);
            return Err(err);
        }
        Ok(serialno)
    }

    /// Route an inbound operation to the continuations registered under its
    /// reference number. Returns how many continuations ran.
    ///
    /// Operations without a reference number, or referring to nothing
    /// registered, are dropped.
    pub fn on_operation_received(&self, op: &Operation) -> usize {
        let Some(refno) = op.refno else {
            debug!("dropping unsolicited {} operation without refno", op.kind);
            return 0;
        };
        // Continuations run unlocked so they can issue further requests.
        let continuations: Vec<Continuation> = {
            let pending = self.pending.lock();
            match pending.get(&refno) {
                Some(regs) => regs.iter().map(|r| r.continuation.clone()).collect(),
                None => {
                    debug!("dropping {} operation for unknown refno {refno}", op.kind);
                    return 0;
                }
            }
        };
        for continuation in &continuations {
            continuation(op);
        }
        continuations.len()
    }

    /// Drop every continuation registered under `serialno`.
    /// Returns how many were removed.
    pub fn forget(&self, serialno: i64) -> usize {
        self.pending
            .lock()
            .remove(&serialno)
            .map(|regs| regs.len())
            .unwrap_or(0)
    }

    /// Drop registrations older than `max_age`. Returns how many were removed.
    pub fn evict_idle(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        let mut pending = self.pending.lock();
        pending.retain(|_, regs| {
            let before = regs.len();
            regs.retain(|r| now.duration_since(r.registered_at) < max_age);
            removed += before - regs.len();
            !regs.is_empty()
        });
        removed
    }

    pub fn is_pending(&self, serialno: i64) -> bool {
        self.pending.lock().contains_key(&serialno)
    }

    /// Total number of live registrations.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().values().map(Vec::len).sum()
    }

    fn withdraw(&self, serialno: i64, id: u64) {
        let mut pending = self.pending.lock();
        if let Some(regs) = pending.get_mut(&serialno) {
            regs.retain(|r| r.id != id);
            if regs.is_empty() {
                pending.remove(&serialno);
            }
        }
    }
}
