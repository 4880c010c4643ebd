pub mod errors;
pub mod paper;
pub mod remote;
pub mod session;
pub mod traits;

pub use errors::TerminalError;
pub use paper::PaperTerminal;
pub use remote::BridgeTerminal;
pub use session::{TerminalGate, TerminalSession};
pub use traits::ExecutionTerminal;

#[cfg(any(test, feature = "mock"))]
pub use traits::MockExecutionTerminal;
