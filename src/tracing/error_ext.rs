//! Error tracing extensions
//!
//! Logs a [`BridgeError`] together with its code, classification and source chain.

use crate::types::BridgeError;
use std::error::Error as StdError;

/// Extension trait for adding tracing context to errors
pub trait ErrorTraceExt {
    /// Log error with full context including error code, retryable status, and error chain
    fn trace_error(&self) -> &Self;
}

impl ErrorTraceExt for BridgeError {
    fn trace_error(&self) -> &Self {
        let error_code = self.error_code();

        let mut error_chain = Vec::new();
        let mut current_source = self.source();
        while let Some(source) = current_source {
            error_chain.push(source.to_string());
            current_source = source.source();
        }

        if self.is_cancellation() {
            tracing::info!(
                error = %self,
                error_code = error_code.code(),
                "Operation cancelled"
            );
            return self;
        }

        tracing::error!(
            error = %self,
            error_code = error_code.code(),
            error_code_name = ?error_code,
            is_retryable = self.is_retryable(),
            is_client_error = self.is_client_error(),
            error_chain_len = error_chain.len(),
            error_chain = ?error_chain,
            "Error occurred with full context"
        );

        self
    }
}

/// Extension trait for Result types
pub trait ResultTraceExt<T, E>: Sized {
    /// Convert error to BridgeError and log with context
    fn trace_context(self) -> Result<T, BridgeError>
    where
        E: StdError + Send + Sync + 'static;
}

impl<T, E> ResultTraceExt<T, E> for Result<T, E>
where
    E: StdError + Send + Sync + 'static,
    BridgeError: From<E>,
{
    fn trace_context(self) -> Result<T, BridgeError> {
        self.map_err(|e| {
            let bridge_error = BridgeError::from(e);
            bridge_error.trace_error();
            bridge_error
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_trace_ext() {
        let error = BridgeError::spawn(
            "node",
            std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
        );
        let _ = error.trace_error();
    }

    #[test]
    fn test_cancellation_traced_quietly() {
        let error = BridgeError::Interrupted("tab-1".to_string());
        let _ = error.trace_error();
    }

    #[test]
    fn test_result_trace_ext() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "Broken pipe",
        ));

        let err = result.trace_context().unwrap_err();
        assert!(matches!(err, BridgeError::Io(_)));
    }
}
