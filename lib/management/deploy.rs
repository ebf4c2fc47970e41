//! First-time deployment of an environment.

use tracing::{error, info, warn};

use crate::{
    config::EnvironmentConfig,
    render::DeploymentBundle,
    substrate::{Environment, Substrate},
    EposctlResult,
};

use super::{env, locks, ontology};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Deploys a new environment from a validated configuration.
///
/// The name must be free on the target substrate. Failures before the
/// stack is started leave nothing behind; failures afterwards tear the
/// started stack down again and surface the original error. Only a
/// failure of the final registry write leaves the stack running, since
/// the environment itself is healthy at that point.
pub async fn deploy(
    substrate: &dyn Substrate,
    mut config: EnvironmentConfig,
    pull_images: bool,
) -> EposctlResult<Environment> {
    config.validate()?;

    let _guard = locks::lock_environment(config.get_name()).await;
    env::ensure_absent(substrate, config.get_name()).await?;

    info!(
        "Deploying environment `{}` on the {} substrate",
        config.get_name(),
        substrate.kind()
    );

    substrate.preflight(&mut config).await?;

    if pull_images {
        substrate.pull_images(&config).await?;
    }

    let bundle = substrate.render_bundle(&config).await?;

    let environment = match start_stack(substrate, &config, &bundle).await {
        Ok(environment) => environment,
        Err(error) => {
            error!("Deploy of `{}` failed: {}", config.get_name(), error);
            if let Err(teardown) = substrate.down(config.get_name(), true).await {
                warn!("Teardown after the failed deploy also failed: {}", teardown);
            }
            return Err(error);
        }
    };

    if let Err(error) = substrate.record(&environment).await {
        if let Err(rollback) = substrate.erase_record(environment.get_name()).await {
            warn!("Rolling back the registry record also failed: {}", rollback);
        }
        return Err(error);
    }

    info!(
        "Environment `{}` is up at {}",
        environment.get_name(),
        environment.get_urls().get_gui()
    );

    Ok(environment)
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Brings the stack up and readies it for use. Failures in here oblige
/// the caller to tear the stack down.
async fn start_stack(
    substrate: &dyn Substrate,
    config: &EnvironmentConfig,
    bundle: &DeploymentBundle,
) -> EposctlResult<Environment> {
    substrate.up(config, bundle, true).await?;
    substrate.wait_ready(config).await?;

    let urls = substrate.build_urls(config).await?;
    ontology::bootstrap_ontologies(urls.get_api()).await?;

    Ok(substrate.assemble(config.clone(), urls))
}
