//! Lifecycle operations over a runtime substrate.
//!
//! Every operation here is stateless glue: it composes the configuration
//! model, the renderers and a [`Substrate`](crate::substrate::Substrate)
//! into one multi-phase call with explicit failure semantics. Operations
//! on the same environment name serialize against each other; different
//! names proceed in parallel.

use std::future::Future;

use crate::{config::OPERATION_TIMEOUT, error::EposctlError, EposctlResult};

mod clean;
mod delete;
mod deploy;
mod env;
mod locks;
mod ontology;
mod populate;
mod snapshot;
mod update;
mod update_check;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use clean::*;
pub use delete::*;
pub use deploy::*;
pub use env::*;
pub use ontology::*;
pub use populate::*;
pub use update::*;
pub use update_check::*;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Caps a lifecycle operation at the global operation timeout.
///
/// A stuck subprocess or an unresponsive cluster otherwise hangs the
/// process indefinitely; the wrapper turns that into a typed error after
/// ten minutes.
pub async fn with_deadline<T, F>(operation: F) -> EposctlResult<T>
where
    F: Future<Output = EposctlResult<T>>,
{
    match tokio::time::timeout(OPERATION_TIMEOUT, operation).await {
        Ok(result) => result,
        Err(_) => Err(EposctlError::OperationTimeout(OPERATION_TIMEOUT.as_secs())),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_deadline_passes_results_through() {
        let result = with_deadline(async { Ok::<_, EposctlError>(42) }).await;
        assert_eq!(result.unwrap(), 42);

        let result: EposctlResult<()> =
            with_deadline(async { Err(EposctlError::EnvironmentNotFound("x".into())) }).await;
        assert!(matches!(result, Err(EposctlError::EnvironmentNotFound(_))));
    }
}
