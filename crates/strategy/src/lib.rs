pub mod close_policy;
pub mod filter;
pub mod sizing;

pub use close_policy::{CloseDecision, ClosePolicy};
pub use filter::{
    ActionableSignal, FreshSignalFilter, Rejection, SignalFilter, StrongKeywordFilter,
    build_filter,
};
pub use sizing::PositionSizer;
