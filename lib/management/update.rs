//! Update of a deployed environment, with rollback on failure.

use tracing::{error, info, warn};

use crate::{
    config::EnvironmentConfig,
    error::EposctlError,
    substrate::{Environment, Substrate, SubstrateKind},
    utils, EposctlResult,
};

use super::{locks, ontology, snapshot::BackupSnapshot};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Re-applies an environment, optionally with a different configuration.
///
/// With no `new_config` and no `reset` the currently deployed
/// configuration is re-applied verbatim, which makes the operation a safe
/// way to restart a drifted stack. `reset` swaps in the substrate's
/// default configuration instead and is mutually exclusive with
/// `new_config`. `force` additionally drops the environment's state:
/// volumes are removed, ontologies re-registered and the ingested-file
/// history cleared.
///
/// Environments with an on-disk directory are backed up before anything
/// is touched; on failure the directory is restored and the previous
/// stack brought back up, and the original error is returned. Directory-
/// less environments rely on the substrate's own atomic rollback.
pub async fn update(
    substrate: &dyn Substrate,
    name: &str,
    new_config: Option<EnvironmentConfig>,
    pull_images: bool,
    force: bool,
    reset: bool,
) -> EposctlResult<Environment> {
    if reset && new_config.is_some() {
        return Err(EposctlError::InvalidInput(
            "a configuration file and a reset are mutually exclusive".to_string(),
        ));
    }

    let _guard = locks::lock_environment(name).await;
    let environment = substrate.get(name).await?;

    let config = resolve_config(&environment, name, new_config, reset)?;
    config.validate()?;

    info!(
        "Updating environment `{}` on the {} substrate",
        name,
        substrate.kind()
    );

    let changed = environment.get_config().diff(&config)?;
    if !changed.is_empty() {
        info!("Configuration changes: {}", changed.join(", "));
    }

    let environment = match environment.get_directory() {
        Some(directory) => {
            let mut snapshot = BackupSnapshot::take(directory).await?;
            match converge(substrate, &config, pull_images, force, true).await {
                Ok(environment) => {
                    snapshot.discard();
                    environment
                }
                Err(primary) => {
                    error!("Update of `{}` failed: {}", name, primary);
                    if let Err(secondary) = roll_back(&mut snapshot, substrate, name).await {
                        warn!("Rollback of `{}` also failed: {}", name, secondary);
                    }
                    return Err(primary);
                }
            }
        }
        None => converge(substrate, &config, pull_images, force, false).await?,
    };

    info!("Environment `{}` updated", name);
    Ok(environment)
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Picks the configuration the update converges towards.
fn resolve_config(
    environment: &Environment,
    name: &str,
    new_config: Option<EnvironmentConfig>,
    reset: bool,
) -> EposctlResult<EnvironmentConfig> {
    if reset {
        return Ok(match environment.get_kind() {
            SubstrateKind::Docker => EnvironmentConfig::default_docker(name),
            SubstrateKind::K8s => EnvironmentConfig::default_k8s(name),
        });
    }

    match new_config {
        Some(config) if config.get_name() != name => Err(EposctlError::InvalidInput(format!(
            "configuration is named `{}` but the environment is `{}`",
            config.get_name(),
            name
        ))),
        Some(config) => Ok(config),
        None => Ok(environment.get_config().clone()),
    }
}

/// Re-renders and re-applies the stack under the given configuration.
///
/// `replace_directory` selects the install-from-scratch variant used for
/// directory-backed environments; without it the substrate upgrades the
/// running stack in place.
async fn converge(
    substrate: &dyn Substrate,
    config: &EnvironmentConfig,
    pull_images: bool,
    force: bool,
    replace_directory: bool,
) -> EposctlResult<Environment> {
    let name = config.get_name();

    if replace_directory {
        if force {
            substrate.down(name, true).await?;
        }
        utils::remove_dir_all_if_exists(utils::environment_dir(name)).await?;
    }

    let bundle = substrate.render_bundle(config).await?;

    if pull_images {
        substrate.pull_images(config).await?;
    }

    substrate.up(config, &bundle, false).await?;
    substrate.wait_ready(config).await?;

    let urls = substrate.build_urls(config).await?;

    if force {
        ontology::bootstrap_ontologies(urls.get_api()).await?;
        substrate.clear_ingested(name).await?;
    }

    let environment = substrate.assemble(config.clone(), urls);
    substrate.record(&environment).await?;

    Ok(environment)
}

/// Puts the directory back and brings the previous stack up again.
async fn roll_back(
    snapshot: &mut BackupSnapshot,
    substrate: &dyn Substrate,
    name: &str,
) -> EposctlResult<()> {
    snapshot.restore().await?;
    substrate.resume(name).await
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::build_docker_urls;

    fn docker_environment(name: &str) -> Environment {
        let config = EnvironmentConfig::default_docker(name);
        let urls = build_docker_urls(&config);
        Environment::builder()
            .name(name.to_string())
            .kind(SubstrateKind::Docker)
            .config(config)
            .urls(urls)
            .build()
    }

    #[test]
    fn test_resolve_config_rejects_a_renamed_document() {
        let environment = docker_environment("alpha");
        let foreign = EnvironmentConfig::default_docker("beta");

        let result = resolve_config(&environment, "alpha", Some(foreign), false);
        assert!(matches!(result, Err(EposctlError::InvalidInput(_))));
    }

    #[test]
    fn test_resolve_config_reuses_the_deployed_document() {
        let environment = docker_environment("alpha");

        let config = resolve_config(&environment, "alpha", None, false).unwrap();
        assert_eq!(config.get_name(), "alpha");
        assert_eq!(&config, environment.get_config());
    }

    #[test]
    fn test_resolve_config_reset_falls_back_to_the_default_document() {
        let environment = docker_environment("alpha");

        let config = resolve_config(&environment, "alpha", None, true).unwrap();
        assert_eq!(config, EnvironmentConfig::default_docker("alpha"));
    }
}
