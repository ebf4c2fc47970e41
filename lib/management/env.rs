//! Read-side environment queries.

use crate::{
    error::EposctlError,
    substrate::{Environment, Substrate},
    EposctlResult,
};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Fetches one environment by name.
pub async fn get_environment(substrate: &dyn Substrate, name: &str) -> EposctlResult<Environment> {
    substrate.get(name).await
}

/// Lists all environments hosted on the substrate.
pub async fn list_environments(substrate: &dyn Substrate) -> EposctlResult<Vec<Environment>> {
    substrate.list().await
}

/// Fails with a typed conflict when an environment of the given name
/// already exists.
pub(super) async fn ensure_absent(substrate: &dyn Substrate, name: &str) -> EposctlResult<()> {
    match substrate.get(name).await {
        Ok(_) => Err(EposctlError::EnvironmentExists(name.to_string())),
        Err(error) if error.is_not_found() => Ok(()),
        Err(error) => Err(error),
    }
}
