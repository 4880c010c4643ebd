pub mod errors;
pub mod remote;
pub mod traits;

pub use errors::SignalError;
pub use remote::{SignalClient, SignalEnvelope};
pub use traits::SignalSource;

#[cfg(any(test, feature = "mock"))]
pub use traits::MockSignalSource;
