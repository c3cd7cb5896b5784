//! Transport seam between the correlator and whatever moves operations.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use worldsync_element_core::codec;

use crate::Operation;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is disconnected")]
    Disconnected,
    #[error("transport rejected operation: {0}")]
    Rejected(String),
    #[error("transport write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound half of a connection to the remote world.
///
/// Inbound operations are not pulled through this trait: whoever runs the
/// connection's event loop hands them to `Correlator::on_operation_received`.
pub trait Transport: Send + Sync {
    fn send(&self, op: &Operation) -> Result<(), TransportError>;

    /// Called before a request with `serialno` is sent, for transports that
    /// route responses by serial number themselves.
    fn await_response(&self, serialno: i64) {
        let _ = serialno;
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, op: &Operation) -> Result<(), TransportError> {
        (**self).send(op)
    }

    fn await_response(&self, serialno: i64) {
        (**self).await_response(serialno)
    }
}

/// Transport writing each operation as one encoded stream to a byte sink.
#[derive(Debug)]
pub struct StreamTransport<W: Write + Send> {
    sink: Mutex<Option<W>>,
}

impl<W: Write + Send> StreamTransport<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink: Mutex::new(Some(sink)),
        }
    }

    /// Detach and return the sink; later sends fail with `Disconnected`.
    pub fn close(&self) -> Option<W> {
        self.sink.lock().take()
    }
}

impl<W: Write + Send> Transport for StreamTransport<W> {
    fn send(&self, op: &Operation) -> Result<(), TransportError> {
        let mut guard = self.sink.lock();
        let sink = guard.as_mut().ok_or(TransportError::Disconnected)?;
        let text = codec::encode(&op.to_element());
        sink.write_all(text.as_bytes())?;
        sink.write_all(b"\n")?;
        sink.flush()?;
        Ok(())
    }
}
