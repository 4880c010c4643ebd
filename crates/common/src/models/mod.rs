pub mod account;
pub mod order;
pub mod position;
pub mod signal;

pub use account::{AccountInfo, SymbolInfo, Tick, VolumeConstraints};
pub use order::{FillPolicy, OrderRequest, OrderResult, TimePolicy, RETCODE_DONE};
pub use position::{OpenPosition, Position, Side};
pub use signal::{Signal, SignalAction, SignalStrength, SymbolField};
