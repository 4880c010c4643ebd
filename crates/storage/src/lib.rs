pub mod position_store;

pub use position_store::PositionStore;
