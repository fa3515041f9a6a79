use crate::rooms::protocol::ProtocolError;
use crate::store::StoreError;

/// Why an inbound event was not carried out.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type RelayResult<T> = Result<T, RelayError>;
