//! apicheck-runner: HTTP transports and test execution

pub mod cancel;
pub mod orchestrator;
pub mod simulate;
pub mod transport;

pub use cancel::CancelToken;
pub use orchestrator::{BatchOptions, Orchestrator};
pub use simulate::{SimulatedRoute, SimulatedTransport, SimulationError};
pub use transport::{PreparedRequest, ReqwestTransport, Transport, TransportError};
