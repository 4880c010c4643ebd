use async_trait::async_trait;
use common::models::Signal;

use crate::errors::SignalError;

/// Where pending trade signals come from. At most one signal per call.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn fetch_signal(&self) -> Result<Option<Signal>, SignalError>;
}
