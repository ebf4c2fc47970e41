//! State wipe of a running environment.

use tracing::{error, info, warn};

use crate::{
    substrate::{Environment, Substrate},
    EposctlResult,
};

use super::{locks, ontology};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Destroys an environment's stateful data while keeping its containers
/// and configuration.
///
/// The metadata database is recreated empty, dependent services are
/// restarted against it, the ingested-file history is dropped and the
/// ontologies registered anew. On failure the stack is brought back up
/// best-effort and the original error surfaced.
pub async fn clean(substrate: &dyn Substrate, name: &str) -> EposctlResult<()> {
    let _guard = locks::lock_environment(name).await;
    let environment = substrate.get(name).await?;

    info!("Cleaning environment `{}`", name);

    if let Err(primary) = wipe_state(substrate, &environment).await {
        error!("Clean of `{}` failed: {}", name, primary);
        if let Err(secondary) = substrate.resume(name).await {
            warn!(
                "Bringing `{}` back up after the failed clean also failed: {}",
                name, secondary
            );
        }
        return Err(primary);
    }

    info!("Environment `{}` cleaned", name);
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn wipe_state(substrate: &dyn Substrate, environment: &Environment) -> EposctlResult<()> {
    substrate.clean_state(environment).await?;
    substrate.clear_ingested(environment.get_name()).await?;
    ontology::bootstrap_ontologies(environment.get_urls().get_api()).await
}
