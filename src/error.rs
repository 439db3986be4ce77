use thiserror::Error;

/// Errors surfaced by service operations.
///
/// `NotFound` covers ids that do not resolve *and* entities the principal
/// is not allowed to see - the two are indistinguishable to the caller so
/// that existence is never leaked. `PermissionDenied` is only returned for
/// entities the principal can already see.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_passes_through() {
        let err = ServiceError::Validation("folder name already in use".to_string());
        assert_eq!(err.to_string(), "folder name already in use");
    }

    #[test]
    fn storage_errors_convert_via_from() {
        fn fails() -> Result<()> {
            Err(rusqlite::Error::QueryReturnedNoRows)?
        }
        assert!(matches!(fails(), Err(ServiceError::Storage(_))));
    }
}
