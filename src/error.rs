use thiserror::Error;

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::core::{ConversionError, CoreError, OperationError, RecoveryError, TypeInferenceError};
use crate::persist::PersistError;

/// Crate-level convenience error.
///
/// Not a "god error": it is a thin wrapper over canonical capability errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// A command-line argument names nothing in the study.
    #[error("{0}")]
    Usage(String),

    #[error("failed to write output: {0}")]
    Output(#[source] std::io::Error),
}

impl From<OperationError> for Error {
    fn from(err: OperationError) -> Self {
        Error::Core(err.into())
    }
}

impl From<TypeInferenceError> for Error {
    fn from(err: TypeInferenceError) -> Self {
        Error::Core(err.into())
    }
}

impl From<ConversionError> for Error {
    fn from(err: ConversionError) -> Self {
        Error::Core(err.into())
    }
}

impl From<RecoveryError> for Error {
    fn from(err: RecoveryError) -> Self {
        Error::Core(err.into())
    }
}

impl Error {
    /// The request was refused by the model; nothing was changed.
    pub fn is_refusal(&self) -> bool {
        matches!(self, Error::Core(_) | Error::Usage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NodeId;

    #[test]
    fn operation_errors_lift_into_core() {
        let err: Error = OperationError::FrozenCase {
            case: NodeId::new(3),
        }
        .into();
        assert!(err.is_refusal());
        assert_eq!(err.to_string(), "case #3 is frozen");
    }
}
