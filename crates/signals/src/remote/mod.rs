pub mod signal_client;
pub mod signal_response;

pub use signal_client::SignalClient;
pub use signal_response::SignalEnvelope;
