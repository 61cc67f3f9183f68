//! Error recovery policy for the keyword pipeline.
//!
//! Stages hand their errors to [`ErrorRecovery`] instead of deciding locally
//! whether to continue. The orchestrator is the only place that turns a
//! [`RecoveryResult::Failed`] into an aborted run.

use crate::{CoreError, ErrorExt, ErrorReporter};
use tracing::warn;

/// Recovery strategy for handling errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Retry the operation with exponential backoff
    Retry,
    /// Skip the operation and continue
    Skip,
    /// Continue with whatever was gathered so far
    Degrade,
    /// Abort the run
    Fail,
}

/// Result of an error recovery attempt
#[derive(Debug)]
pub enum RecoveryResult<T> {
    /// Recovery was successful, operation can continue
    Recovered(T),
    /// Recovery failed, but we can continue with degraded functionality
    Degraded(T),
    /// Recovery failed, operation should be skipped
    Skipped,
    /// Recovery failed, error should be propagated
    Failed(CoreError),
}

impl<T> RecoveryResult<T> {
    pub fn is_recovered(&self) -> bool {
        matches!(self, RecoveryResult::Recovered(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, RecoveryResult::Degraded(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RecoveryResult::Skipped)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RecoveryResult::Failed(_))
    }

    /// Collapse into a plain result, substituting `T::default()` for skipped work.
    pub fn into_result(self) -> Result<T, CoreError>
    where
        T: Default,
    {
        match self {
            RecoveryResult::Recovered(value) | RecoveryResult::Degraded(value) => Ok(value),
            RecoveryResult::Skipped => Ok(T::default()),
            RecoveryResult::Failed(error) => Err(error),
        }
    }

    /// Returns the error if failed, None otherwise
    pub fn err(self) -> Option<CoreError> {
        match self {
            RecoveryResult::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Error recovery handler that provides strategies for different error types
pub struct ErrorRecovery;

impl ErrorRecovery {
    /// Determine the appropriate recovery strategy for a given error
    pub fn determine_strategy(error: &CoreError) -> RecoveryStrategy {
        match error {
            // Rate limits are the only retryable keyword API condition
            CoreError::KeywordApi(api_error) if api_error.is_retryable() => {
                RecoveryStrategy::Retry
            }

            // Any other API or network failure costs the seed its data, nothing more
            CoreError::KeywordApi(_) | CoreError::Network(_) => RecoveryStrategy::Skip,

            // Bad input records are dropped individually
            CoreError::InvalidInput { .. } => RecoveryStrategy::Skip,

            // Store, config and model failures end the run
            CoreError::Database(_)
            | CoreError::Config(_)
            | CoreError::Embedding(_)
            | CoreError::Io(_)
            | CoreError::Serialization(_)
            | CoreError::Internal { .. } => RecoveryStrategy::Fail,
        }
    }

    /// Settle an error that is still standing after any retries ran out.
    ///
    /// `partial` is what the operation had gathered before failing.
    pub fn settle<T>(error: CoreError, partial: T) -> RecoveryResult<T> {
        match Self::determine_strategy(&error) {
            RecoveryStrategy::Retry | RecoveryStrategy::Degrade => {
                warn!(
                    "Retries exhausted ({}), continuing degraded: {}",
                    error.error_code(),
                    error
                );
                RecoveryResult::Degraded(partial)
            }
            RecoveryStrategy::Skip => {
                ErrorReporter::new().report_warning(&error);
                RecoveryResult::Skipped
            }
            RecoveryStrategy::Fail => RecoveryResult::Failed(error),
        }
    }
}
