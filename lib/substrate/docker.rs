//! The local Docker Compose substrate.
//!
//! Environments live as compose projects named after the environment, with
//! their rendered artifacts installed under the eposctl home directory and
//! their records kept in the local SQLite registry. The compose file is
//! fully expanded at render time, so every invocation here works from
//! project name plus artifact paths alone.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use oci_spec::distribution::Reference;
use sqlx::{Pool, Sqlite};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::{
    config::{build_docker_urls, EnvUrls, EnvironmentConfig},
    error::EposctlError,
    render::{
        self, DeploymentBundle, SERVICE_BACKOFFICE_SERVICE, SERVICE_EXTERNAL_ACCESS_SERVICE,
        SERVICE_INGESTOR_SERVICE, SERVICE_METADATA_DATABASE, SERVICE_RESOURCES_SERVICE,
        VOLUME_METADATA_DATABASE,
    },
    store::{self, EnvironmentRecord},
    utils::{self, COMPOSE_FILENAME, CONFIG_FILENAME, ENV_FILENAME},
    EposctlResult,
};

use super::{process::run_command, Environment, Substrate, SubstrateKind};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Environment variable that makes `docker compose` report progress on
/// stdout, keeping stderr for actual errors.
const COMPOSE_STATUS_STDOUT_ENV_VAR: &str = "COMPOSE_STATUS_STDOUT";

/// Workloads whose containers cache metadata state and must restart after
/// the metadata database is recreated.
const STATEFUL_SERVICES: [&str; 4] = [
    SERVICE_BACKOFFICE_SERVICE,
    SERVICE_INGESTOR_SERVICE,
    SERVICE_EXTERNAL_ACCESS_SERVICE,
    SERVICE_RESOURCES_SERVICE,
];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The Docker Compose substrate backend.
pub struct DockerSubstrate {
    /// Connection pool of the local environment registry.
    pool: Pool<Sqlite>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DockerSubstrate {
    /// Connects to the local environment registry, creating the database on
    /// first use.
    pub async fn connect() -> EposctlResult<Self> {
        let pool = store::init_registry(utils::registry_db_path()).await?;
        Ok(Self { pool })
    }

    /// The registry connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Builds an [`Environment`] from a registry record and the on-disk
    /// configuration document, which is authoritative. When the two
    /// disagree the record is refreshed from the document.
    async fn hydrate(&self, record: EnvironmentRecord) -> EposctlResult<Environment> {
        let directory = record.directory.as_deref().map(PathBuf::from);
        let config_path = directory
            .as_ref()
            .map(|directory| directory.join(CONFIG_FILENAME));

        let config = match &config_path {
            Some(path) if path.exists() => EnvironmentConfig::from_file(path).await?,
            _ => {
                return Err(EposctlError::custom(anyhow::anyhow!(
                    "environment `{}` has no configuration document on disk; \
                     its registry record may be stale",
                    record.name
                )));
            }
        };

        let urls = build_docker_urls(&config);
        let environment = Environment::builder()
            .name(record.name.clone())
            .kind(SubstrateKind::Docker)
            .config(config)
            .urls(urls.clone())
            .directory(directory)
            .build();

        let drifted = urls.get_api() != &record.api_url
            || urls.get_gui() != &record.gui_url
            || urls.get_backoffice() != &record.backoffice_url;
        if drifted {
            warn!(
                "Registry record for `{}` disagrees with its configuration document, resyncing",
                record.name
            );
            self.record(&environment).await?;
        }

        Ok(environment)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the repository digest of a locally cached image, or `None` when
/// the image is not present in the local daemon.
pub async fn local_image_digest(image: &Reference) -> EposctlResult<Option<String>> {
    let mut command = Command::new("docker");
    command
        .arg("image")
        .arg("inspect")
        .arg("--format")
        .arg("{{index .RepoDigests 0}}")
        .arg(image.to_string());

    match run_command(command, true).await {
        Ok(stdout) => Ok(stdout
            .trim()
            .split('@')
            .nth(1)
            .map(|digest| digest.to_string())),
        Err(EposctlError::CommandFailed { .. }) => Ok(None),
        Err(error) => Err(error),
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Builds a `docker compose` invocation scoped to the given project. When a
/// directory is known its compose and env files are passed explicitly;
/// otherwise compose resolves the project from container labels.
fn compose_command(name: &str, directory: Option<&Path>) -> Command {
    let mut command = Command::new("docker");
    command.arg("compose").arg("-p").arg(name);

    if let Some(directory) = directory {
        command
            .arg("-f")
            .arg(directory.join(COMPOSE_FILENAME))
            .arg("--env-file")
            .arg(directory.join(ENV_FILENAME));
    }

    command.env(COMPOSE_STATUS_STDOUT_ENV_VAR, "1");
    command
}

/// Name compose gives the metadata database volume of a project.
fn metadata_volume(name: &str) -> String {
    format!("{}_{}", name, VOLUME_METADATA_DATABASE)
}

/// Returns the environment directory when its compose file is installed.
fn installed_directory(name: &str) -> Option<PathBuf> {
    let directory = utils::environment_dir(name);
    directory.join(COMPOSE_FILENAME).exists().then_some(directory)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl Substrate for DockerSubstrate {
    fn kind(&self) -> SubstrateKind {
        SubstrateKind::Docker
    }

    async fn preflight(&self, config: &mut EnvironmentConfig) -> EposctlResult<()> {
        let reassigned = config.ensure_free_ports()?;
        if reassigned.is_empty() {
            debug!("All published ports are free");
        }
        Ok(())
    }

    async fn pull_images(&self, config: &EnvironmentConfig) -> EposctlResult<()> {
        for workload in config.enabled_workloads() {
            let Some(image) = config.get_images().get(workload) else {
                continue;
            };

            info!("Pulling image {}", image);
            let mut command = Command::new("docker");
            command.arg("pull").arg(image.to_string());
            run_command(command, false).await?;
        }

        Ok(())
    }

    async fn render_bundle(&self, config: &EnvironmentConfig) -> EposctlResult<DeploymentBundle> {
        render::render_docker(config).await
    }

    async fn up(
        &self,
        config: &EnvironmentConfig,
        bundle: &DeploymentBundle,
        _fresh: bool,
    ) -> EposctlResult<()> {
        let directory = utils::environment_dir(config.get_name());
        bundle.install_into(&directory).await?;

        let mut command = compose_command(config.get_name(), Some(&directory));
        command.arg("up").arg("-d").arg("--remove-orphans");
        run_command(command, false).await?;

        Ok(())
    }

    async fn wait_ready(&self, _config: &EnvironmentConfig) -> EposctlResult<()> {
        // Start-up ordering is enforced by the compose health checks.
        Ok(())
    }

    async fn down(&self, name: &str, volumes: bool) -> EposctlResult<()> {
        let mut command = compose_command(name, installed_directory(name).as_deref());
        command.arg("down");
        if volumes {
            command.arg("-v");
        }
        run_command(command, false).await?;

        Ok(())
    }

    async fn build_urls(&self, config: &EnvironmentConfig) -> EposctlResult<EnvUrls> {
        Ok(build_docker_urls(config))
    }

    fn assemble(&self, config: EnvironmentConfig, urls: EnvUrls) -> Environment {
        let directory = utils::environment_dir(config.get_name());
        Environment::builder()
            .name(config.get_name().clone())
            .kind(SubstrateKind::Docker)
            .config(config)
            .urls(urls)
            .directory(Some(directory))
            .build()
    }

    async fn resume(&self, name: &str) -> EposctlResult<()> {
        let mut command = compose_command(name, installed_directory(name).as_deref());
        command.arg("up").arg("-d").arg("--remove-orphans");
        run_command(command, false).await?;

        Ok(())
    }

    async fn record(&self, environment: &Environment) -> EposctlResult<()> {
        let config = environment.get_config();
        let urls = environment.get_urls();
        let components = config.get_components();

        let now = Utc::now();
        let record = EnvironmentRecord {
            name: environment.get_name().clone(),
            directory: environment
                .get_directory()
                .as_ref()
                .map(|directory| directory.display().to_string()),
            gui_url: urls.get_gui().clone(),
            api_url: urls.get_api().clone(),
            backoffice_url: urls.get_backoffice().clone(),
            gui_port: *components.get_platform_gui().get_port(),
            api_port: *components.get_gateway().get_port(),
            backoffice_port: components
                .get_backoffice()
                .get_enabled()
                .then(|| *components.get_backoffice().get_gui().get_port()),
            created_at: now,
            modified_at: now,
        };

        store::upsert_environment(&self.pool, &record).await
    }

    async fn erase_record(&self, name: &str) -> EposctlResult<()> {
        store::delete_environment(&self.pool, name).await
    }

    async fn list(&self) -> EposctlResult<Vec<Environment>> {
        let records = store::list_environments(&self.pool).await?;

        let mut environments = Vec::with_capacity(records.len());
        for record in records {
            let name = record.name.clone();
            match self.hydrate(record).await {
                Ok(environment) => environments.push(environment),
                Err(error) => warn!("Skipping environment `{}`: {}", name, error),
            }
        }

        Ok(environments)
    }

    async fn get(&self, name: &str) -> EposctlResult<Environment> {
        let record = store::get_environment(&self.pool, name)
            .await?
            .ok_or_else(|| EposctlError::EnvironmentNotFound(name.to_string()))?;

        self.hydrate(record).await
    }

    async fn delete(&self, name: &str) -> EposctlResult<()> {
        self.down(name, true).await?;

        utils::remove_dir_all_if_exists(utils::environment_dir(name)).await?;
        store::delete_environment(&self.pool, name).await?;
        store::clear_ingested_files(&self.pool, name).await?;

        Ok(())
    }

    async fn clean_state(&self, environment: &Environment) -> EposctlResult<()> {
        let name = environment.get_name();
        let directory = installed_directory(name);
        let directory = directory.as_deref();

        // Take the metadata database out first so its volume can be removed.
        let mut command = compose_command(name, directory);
        command.arg("stop").arg(SERVICE_METADATA_DATABASE);
        run_command(command, false).await?;

        let mut command = compose_command(name, directory);
        command.arg("rm").arg("-f").arg(SERVICE_METADATA_DATABASE);
        run_command(command, false).await?;

        let mut command = Command::new("docker");
        command
            .arg("volume")
            .arg("rm")
            .arg("-f")
            .arg(metadata_volume(name));
        run_command(command, false).await?;

        // Restart the services that cache metadata state so they
        // re-initialise against the fresh database.
        let enabled = environment.get_config().enabled_workloads();
        let enabled_services: Vec<&str> = enabled
            .iter()
            .filter_map(|workload| render::service_name(workload))
            .collect();

        let mut command = compose_command(name, directory);
        command.arg("stop");
        for service in STATEFUL_SERVICES {
            if enabled_services.contains(&service) {
                command.arg(service);
            }
        }
        run_command(command, false).await?;

        let mut command = compose_command(name, directory);
        command.arg("up").arg("-d").arg("--remove-orphans");
        run_command(command, false).await?;

        Ok(())
    }

    async fn record_ingested(&self, name: &str, path: &Path) -> EposctlResult<()> {
        store::record_ingested_file(&self.pool, name, path).await
    }

    async fn ingested_files(&self, name: &str) -> EposctlResult<Vec<PathBuf>> {
        store::list_ingested_files(&self.pool, name).await
    }

    async fn clear_ingested(&self, name: &str) -> EposctlResult<()> {
        store::clear_ingested_files(&self.pool, name).await
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use std::env;
    use tempfile::tempdir;

    use crate::utils::EPOSCTL_HOME_ENV_VAR;

    use super::super::process::render_command;
    use super::*;

    #[test]
    fn test_compose_command_scopes_the_project() {
        let directory = Path::new("/envs/e1");
        let command = compose_command("e1", Some(directory));

        assert_eq!(
            render_command(&command),
            "docker compose -p e1 -f /envs/e1/docker-compose.yaml --env-file /envs/e1/.env"
        );

        let status_stdout = command
            .as_std()
            .get_envs()
            .any(|(key, _)| key == COMPOSE_STATUS_STDOUT_ENV_VAR);
        assert!(status_stdout);
    }

    #[test]
    fn test_compose_command_without_directory_uses_project_name_only() {
        let command = compose_command("e1", None);
        assert_eq!(render_command(&command), "docker compose -p e1");
    }

    #[test]
    fn test_metadata_volume_is_project_scoped() {
        assert_eq!(metadata_volume("e1"), "e1_psqldata");
    }

    #[tokio::test]
    #[serial]
    async fn test_record_get_list_round_trip() -> EposctlResult<()> {
        let home = tempdir()?;
        env::set_var(EPOSCTL_HOME_ENV_VAR, home.path());

        let substrate = DockerSubstrate::connect().await?;

        let config = EnvironmentConfig::default_docker("e1");
        let directory = utils::environment_dir("e1");
        config.save(directory.join(CONFIG_FILENAME)).await?;

        let environment = Environment::builder()
            .name("e1".to_string())
            .kind(SubstrateKind::Docker)
            .config(config.clone())
            .urls(build_docker_urls(&config))
            .directory(Some(directory))
            .build();
        substrate.record(&environment).await?;

        let fetched = substrate.get("e1").await?;
        assert_eq!(fetched.get_config(), &config);
        assert_eq!(fetched.get_urls().get_api(), "http://localhost:33000/api/v1");

        let listed = substrate.list().await?;
        assert_eq!(listed.len(), 1);

        let missing = substrate.get("missing").await.unwrap_err();
        assert!(missing.is_not_found());

        env::remove_var(EPOSCTL_HOME_ENV_VAR);
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn test_get_resyncs_registry_from_on_disk_config() -> EposctlResult<()> {
        let home = tempdir()?;
        env::set_var(EPOSCTL_HOME_ENV_VAR, home.path());

        let substrate = DockerSubstrate::connect().await?;

        let config = EnvironmentConfig::default_docker("e1");
        let directory = utils::environment_dir("e1");
        config.save(directory.join(CONFIG_FILENAME)).await?;

        // A record whose URLs no longer match the configuration document.
        let stale = EnvironmentRecord {
            name: "e1".to_string(),
            directory: Some(directory.display().to_string()),
            gui_url: "http://localhost:9999".to_string(),
            api_url: "http://localhost:9999/api/v1".to_string(),
            backoffice_url: None,
            gui_port: 9999,
            api_port: 9999,
            backoffice_port: None,
            created_at: Utc::now(),
            modified_at: Utc::now(),
        };
        store::upsert_environment(substrate.pool(), &stale).await?;

        let fetched = substrate.get("e1").await?;
        assert_eq!(fetched.get_urls().get_api(), "http://localhost:33000/api/v1");

        let resynced = store::get_environment(substrate.pool(), "e1").await?.unwrap();
        assert_eq!(resynced.api_url, "http://localhost:33000/api/v1");
        assert_eq!(resynced.api_port, 33000);

        env::remove_var(EPOSCTL_HOME_ENV_VAR);
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn test_get_without_on_disk_config_fails() -> EposctlResult<()> {
        let home = tempdir()?;
        env::set_var(EPOSCTL_HOME_ENV_VAR, home.path());

        let substrate = DockerSubstrate::connect().await?;

        let stale = EnvironmentRecord {
            name: "gone".to_string(),
            directory: Some("/nonexistent/gone".to_string()),
            gui_url: "http://localhost:32000".to_string(),
            api_url: "http://localhost:33000/api/v1".to_string(),
            backoffice_url: None,
            gui_port: 32000,
            api_port: 33000,
            backoffice_port: None,
            created_at: Utc::now(),
            modified_at: Utc::now(),
        };
        store::upsert_environment(substrate.pool(), &stale).await?;

        assert!(substrate.get("gone").await.is_err());
        // A broken record must not break listing.
        assert!(substrate.list().await?.is_empty());

        env::remove_var(EPOSCTL_HOME_ENV_VAR);
        Ok(())
    }
}
