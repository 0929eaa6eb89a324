//! Runtime error types.

use herald_core::HandlerType;
use thiserror::Error;

/// Errors that can occur when resolving services from a scope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// No registration exists for the requested type.
    #[error("No service registered for {handler}")]
    NotRegistered { handler: HandlerType },

    /// The stored instance is not of the requested type.
    #[error("Service registered for {handler} produced an instance of another type")]
    TypeMismatch { handler: HandlerType },
}

/// Result type for service resolution.
pub type ServiceResult<T> = Result<T, ServiceError>;
