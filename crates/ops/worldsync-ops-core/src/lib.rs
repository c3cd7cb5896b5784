//! worldsync-ops-core: protocol operations and request/response correlation.
//!
//! * `Operation`: the wire-level request/response record and its element mapping
//! * `SerialNumberGenerator`: process-wide unique serial numbers
//! * `Transport`: the seam to whatever actually moves operations
//! * `Correlator`: routes responses back to the continuation registered for
//!   the request they refer to

pub mod correlator;
pub mod operation;
pub mod serial;
pub mod transport;

pub use correlator::{Continuation, Correlator, CorrelatorError};
pub use operation::{OpKind, Operation, OperationError};
pub use serial::{new_serial_number, SerialNumberGenerator};
pub use transport::{StreamTransport, Transport, TransportError};
