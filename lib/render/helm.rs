//! Rendering of the Kubernetes artifact set.
//!
//! The Helm chart is embedded into the binary and extracted verbatim into the
//! bundle; all environment-specific content lives in the generated values
//! file, which also carries the full configuration document so an installed
//! release can be hydrated back without any local state.

use std::collections::BTreeMap;

use getset::Getters;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::{
        EnvironmentConfig, MetadataDatabase, RabbitMq, GATEWAY_CONTAINER_PORT, MANAGED_BY_VALUE,
        SECURITY_CODE, WORKLOAD_BACKOFFICE_GUI, WORKLOAD_BACKOFFICE_SERVICE,
        WORKLOAD_CONVERTER_ROUTINE, WORKLOAD_CONVERTER_SERVICE, WORKLOAD_EMAIL_SENDER_SERVICE,
        WORKLOAD_EXTERNAL_ACCESS_SERVICE, WORKLOAD_GATEWAY, WORKLOAD_INGESTOR_SERVICE,
        WORKLOAD_METADATA_DATABASE, WORKLOAD_PLATFORM_GUI, WORKLOAD_RABBITMQ,
        WORKLOAD_RESOURCES_SERVICE, WORKLOAD_SHARING_SERVICE,
    },
    utils::{CHART_SUBDIR, CONFIG_FILENAME, VALUES_FILENAME},
    EposctlError, EposctlResult,
};

use super::{service_name, DeploymentBundle, VOLUME_METADATA_DATABASE};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Name the chart gives the environment ingress.
pub const INGRESS_NAME: &str = "epos";

/// Name of the TLS secret the ingress references when TLS is enabled.
const TLS_SECRET_NAME: &str = "epos-tls";

/// Mount path of the metadata database volume.
const METADATA_DB_MOUNT_PATH: &str = "/var/lib/postgresql/data";

/// Default size of the metadata database volume claim.
const METADATA_DB_VOLUME_SIZE: &str = "8Gi";

/// The embedded chart as (relative path, content) pairs, extracted verbatim
/// into every rendered bundle.
pub const CHART_FILES: &[(&str, &str)] = &[
    ("Chart.yaml", include_str!("chart/Chart.yaml")),
    ("values.yaml", include_str!("chart/values.yaml")),
    ("templates/_helpers.tpl", include_str!("chart/templates/_helpers.tpl")),
    ("templates/deployments.yaml", include_str!("chart/templates/deployments.yaml")),
    ("templates/services.yaml", include_str!("chart/templates/services.yaml")),
    ("templates/ingress.yaml", include_str!("chart/templates/ingress.yaml")),
    ("templates/storage.yaml", include_str!("chart/templates/storage.yaml")),
    ("templates/jobs.yaml", include_str!("chart/templates/jobs.yaml")),
];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The values document supplied to every Helm install of an environment.
///
/// Besides the mechanical inputs of the chart templates it embeds the full
/// configuration document under `config`, which is what `helm get values`
/// later hydrates an [`EnvironmentConfig`] from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(rename_all = "camelCase")]
pub struct HelmValues {
    /// Marker value identifying releases owned by this tool.
    pub(crate) managed_by: String,

    /// Shared secret the stack services authenticate to each other with.
    pub(crate) security_code: String,

    /// Image pull secret name, empty when none is configured.
    #[serde(default)]
    pub(crate) image_pull_secret: String,

    /// TLS settings of the ingress.
    pub(crate) tls: TlsValues,

    /// Routing paths of the ingress.
    pub(crate) ingress: IngressValues,

    /// Metadata database volume claim settings.
    pub(crate) persistence: PersistenceValues,

    /// Deployed workloads keyed by service name.
    pub(crate) workloads: BTreeMap<String, WorkloadValues>,

    /// Install-time job settings.
    pub(crate) jobs: JobsValues,

    /// The full configuration document this release was rendered from.
    pub(crate) config: EnvironmentConfig,
}

/// TLS settings of the ingress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(rename_all = "camelCase")]
pub struct TlsValues {
    /// Whether the ingress terminates TLS.
    pub(crate) enabled: bool,

    /// Name of the TLS secret.
    pub(crate) secret_name: String,
}

/// Routing paths of the ingress. Empty strings mean "not routed".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(rename_all = "camelCase")]
pub struct IngressValues {
    /// Explicit ingress host, empty to match any host.
    #[serde(default)]
    pub(crate) host: String,

    /// Path the platform GUI is served under.
    pub(crate) gui_path: String,

    /// Path the public API is served under.
    pub(crate) api_path: String,

    /// Path the backoffice UI is served under, empty when disabled.
    #[serde(default)]
    pub(crate) backoffice_path: String,
}

/// Metadata database volume claim settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(rename_all = "camelCase")]
pub struct PersistenceValues {
    /// Whether the claim is created.
    pub(crate) enabled: bool,

    /// Name of the claim.
    pub(crate) claim: String,

    /// Requested storage size.
    pub(crate) size: String,
}

/// One deployed workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(rename_all = "camelCase")]
pub struct WorkloadValues {
    /// Container image reference.
    pub(crate) image: String,

    /// Container port the matching service routes to.
    pub(crate) port: u16,

    /// Environment variables of the container.
    #[serde(default)]
    pub(crate) env: BTreeMap<String, String>,

    /// Volume claim mounted into the container, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub(crate) volume: Option<VolumeValues>,
}

/// A volume claim mount.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(rename_all = "camelCase")]
pub struct VolumeValues {
    /// Name of the claim.
    pub(crate) claim: String,

    /// Path the volume is mounted at.
    pub(crate) mount_path: String,
}

/// Install-time job settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(rename_all = "camelCase")]
pub struct JobsValues {
    /// The database schema initialisation job.
    pub(crate) initialiser: JobValues,

    /// The catalogue default population job.
    pub(crate) populator: JobValues,
}

/// One install-time job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(rename_all = "camelCase")]
pub struct JobValues {
    /// Whether the job runs on install and upgrade.
    pub(crate) enabled: bool,

    /// Container image reference.
    pub(crate) image: String,

    /// Environment variables of the job container.
    #[serde(default)]
    pub(crate) env: BTreeMap<String, String>,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Renders the Kubernetes artifact set for `config` into a fresh bundle.
///
/// The bundle holds the extracted chart under `chart/`, the generated values
/// file, and a verbatim copy of the configuration document.
pub async fn render_k8s(config: &EnvironmentConfig) -> EposctlResult<DeploymentBundle> {
    let bundle = DeploymentBundle::new()?;

    let chart_root = bundle.file(CHART_SUBDIR);
    for (name, content) in CHART_FILES {
        let path = chart_root.join(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
    }

    let values = build_helm_values(config)?;
    tokio::fs::write(bundle.file(VALUES_FILENAME), serde_yaml::to_string(&values)?).await?;

    config.save(bundle.file(CONFIG_FILENAME)).await?;

    debug!(
        "rendered k8s artifacts for '{}' ({} workloads)",
        config.get_name(),
        values.workloads.len()
    );

    Ok(bundle)
}

/// Builds the values document for `config`.
pub fn build_helm_values(config: &EnvironmentConfig) -> EposctlResult<HelmValues> {
    let settings = config.k8s_settings();
    let components = config.get_components();

    let prefix = if *settings.get_url_prefix_namespace() {
        format!("/{}", config.get_name())
    } else {
        String::new()
    };

    let api_path = ingress_path(&prefix, components.get_gateway().get_base_url());
    let gui_path = ingress_path(&prefix, components.get_platform_gui().get_base_url());
    let backoffice_path = if *components.get_backoffice().get_enabled() {
        ingress_path(
            &prefix,
            components.get_backoffice().get_gui().get_base_url(),
        )
    } else {
        String::new()
    };

    let mut workloads = BTreeMap::new();
    for workload in config.enabled_workloads() {
        let service = service_name(workload).ok_or_else(|| {
            EposctlError::custom(anyhow::anyhow!("unknown workload '{}'", workload))
        })?;

        let volume = (workload == WORKLOAD_METADATA_DATABASE).then(|| VolumeValues {
            claim: VOLUME_METADATA_DATABASE.to_string(),
            mount_path: METADATA_DB_MOUNT_PATH.to_string(),
        });

        workloads.insert(
            service.to_string(),
            WorkloadValues {
                image: workload_image(config, workload)?,
                port: container_port(config, workload),
                env: workload_env(config, workload, &api_path),
                volume,
            },
        );
    }

    let db = components.get_metadata_database();
    let mut populator_env = db_env(db);
    populator_env.insert(
        "GATEWAY_URL".to_string(),
        format!("http://{}:{}", super::SERVICE_GATEWAY, GATEWAY_CONTAINER_PORT),
    );

    let jobs = JobsValues {
        initialiser: JobValues {
            enabled: *settings.get_initialiser_job(),
            image: workload_image(config, WORKLOAD_METADATA_DATABASE)?,
            env: db_env(db),
        },
        populator: JobValues {
            enabled: *settings.get_populator_job(),
            image: workload_image(config, WORKLOAD_INGESTOR_SERVICE)?,
            env: populator_env,
        },
    };

    Ok(HelmValues {
        managed_by: MANAGED_BY_VALUE.to_string(),
        security_code: SECURITY_CODE.to_string(),
        image_pull_secret: settings
            .get_image_pull_secret()
            .clone()
            .unwrap_or_default(),
        tls: TlsValues {
            enabled: *settings.get_tls_enabled(),
            secret_name: TLS_SECRET_NAME.to_string(),
        },
        ingress: IngressValues {
            host: ingress_host(config),
            gui_path,
            api_path,
            backoffice_path,
        },
        persistence: PersistenceValues {
            enabled: true,
            claim: VOLUME_METADATA_DATABASE.to_string(),
            size: METADATA_DB_VOLUME_SIZE.to_string(),
        },
        workloads,
        jobs,
        config: config.clone(),
    })
}

/// The explicit ingress host of `config`, empty when the default domain is
/// kept and routing should match any host.
pub fn ingress_host(config: &EnvironmentConfig) -> String {
    if config.get_domain() == crate::config::DEFAULT_DOMAIN {
        String::new()
    } else {
        config.get_domain().clone()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn workload_image(config: &EnvironmentConfig, workload: &str) -> EposctlResult<String> {
    config
        .get_images()
        .get(workload)
        .map(|image| image.to_string())
        .ok_or_else(|| {
            EposctlError::custom(anyhow::anyhow!(
                "no image configured for workload '{}'",
                workload
            ))
        })
}

fn container_port(config: &EnvironmentConfig, workload: &str) -> u16 {
    match workload {
        WORKLOAD_GATEWAY => GATEWAY_CONTAINER_PORT,
        WORKLOAD_PLATFORM_GUI | WORKLOAD_BACKOFFICE_GUI => 80,
        WORKLOAD_RABBITMQ => 5672,
        WORKLOAD_METADATA_DATABASE => {
            *config.get_components().get_metadata_database().get_port()
        }
        _ => 8080,
    }
}

fn workload_env(
    config: &EnvironmentConfig,
    workload: &str,
    api_path: &str,
) -> BTreeMap<String, String> {
    let components = config.get_components();
    let db = components.get_metadata_database();
    let rabbitmq = components.get_rabbitmq();
    let mut env = BTreeMap::new();

    match workload {
        WORKLOAD_GATEWAY => {
            let gateway = components.get_gateway();
            env.insert("SECURITY_CODE".into(), SECURITY_CODE.into());
            env.insert("BASE_PATH".into(), api_path.to_string());
            env.insert(
                "SWAGGER_TITLE".into(),
                gateway.get_swagger().get_title().clone(),
            );
            env.insert(
                "SWAGGER_DESCRIPTION".into(),
                gateway.get_swagger().get_description().clone(),
            );
            env.insert(
                "AAI_ENABLED".into(),
                gateway.get_aai().get_enabled().to_string(),
            );
            env.insert("AAI_ENDPOINT".into(), gateway.get_aai().get_endpoint().clone());
            env.insert("AAI_KEY".into(), gateway.get_aai().get_key().clone());
            env.insert(
                "CONNECTION_POOL_INIT_SIZE".into(),
                db.get_pool().get_init().to_string(),
            );
            env.insert(
                "CONNECTION_POOL_MIN_SIZE".into(),
                db.get_pool().get_min().to_string(),
            );
            env.insert(
                "CONNECTION_POOL_MAX_SIZE".into(),
                db.get_pool().get_max().to_string(),
            );
            env.extend(db_env(db));
            env.extend(broker_env(rabbitmq));

            if let Some(monitoring) = config.get_monitoring() {
                env.insert(
                    "MONITORING_URL".into(),
                    monitoring.get_url().clone().unwrap_or_default(),
                );
                env.insert(
                    "MONITORING_USER".into(),
                    monitoring.get_user().clone().unwrap_or_default(),
                );
                env.insert(
                    "MONITORING_PASSWORD".into(),
                    monitoring.get_password().clone().unwrap_or_default(),
                );
            }
        }
        WORKLOAD_PLATFORM_GUI => {
            env.insert("API_HOST".into(), api_path.to_string());
            env.insert(
                "BASE_URL".into(),
                components.get_platform_gui().get_base_url().clone(),
            );
        }
        WORKLOAD_BACKOFFICE_GUI => {
            env.insert("API_HOST".into(), api_path.to_string());
            env.insert(
                "BASE_URL".into(),
                components.get_backoffice().get_gui().get_base_url().clone(),
            );
        }
        WORKLOAD_BACKOFFICE_SERVICE => {
            env.insert("SECURITY_CODE".into(), SECURITY_CODE.into());
            env.insert(
                "AUTH_ENABLED".into(),
                components.get_backoffice().get_service().get_auth().to_string(),
            );
            env.extend(db_env(db));
            env.extend(broker_env(rabbitmq));
        }
        WORKLOAD_CONVERTER_SERVICE => {
            env.insert(
                "AUTH_ENABLED".into(),
                components.get_converter().get_auth().to_string(),
            );
            env.extend(broker_env(rabbitmq));
        }
        WORKLOAD_CONVERTER_ROUTINE => {
            env.extend(broker_env(rabbitmq));
        }
        WORKLOAD_RESOURCES_SERVICE => {
            let resources = components.get_resources_service();
            env.insert("SECURITY_CODE".into(), SECURITY_CODE.into());
            env.insert("AUTH_ENABLED".into(), resources.get_auth().to_string());
            env.insert("CACHE_TTL".into(), resources.get_cache_ttl().to_string());
            env.extend(db_env(db));
            env.extend(broker_env(rabbitmq));
        }
        WORKLOAD_INGESTOR_SERVICE => {
            let ingestor = components.get_ingestor_service();
            env.insert("SECURITY_CODE".into(), SECURITY_CODE.into());
            env.insert("AUTH_ENABLED".into(), ingestor.get_auth().to_string());
            env.insert("HASH_ALGORITHM".into(), ingestor.get_hash().clone());
            env.extend(db_env(db));
            env.extend(broker_env(rabbitmq));
        }
        WORKLOAD_EXTERNAL_ACCESS_SERVICE => {
            env.insert(
                "AUTH_ENABLED".into(),
                components.get_external_access_service().get_auth().to_string(),
            );
            env.extend(broker_env(rabbitmq));
        }
        WORKLOAD_SHARING_SERVICE => {
            env.insert(
                "AUTH_ENABLED".into(),
                components.get_sharing_service().get_auth().to_string(),
            );
            env.extend(db_env(db));
            env.extend(broker_env(rabbitmq));
        }
        WORKLOAD_EMAIL_SENDER_SERVICE => {
            let email = components.get_email_sender_service();
            env.insert(
                "ENVIRONMENT_TYPE".into(),
                email.get_environment_type().as_str().to_string(),
            );
            env.insert("MAIL_TYPE".into(), email.get_mail_type().clone());
            env.insert("SENDER_NAME".into(), email.get_sender_name().clone());
            env.insert("SENDER_EMAIL".into(), email.get_sender_email().clone());
            env.insert("MAIL_API_KEY".into(), email.get_mail_api_key().clone());
            env.insert("MAIL_API_SECRET".into(), email.get_mail_api_secret().clone());
            env.extend(broker_env(rabbitmq));
        }
        WORKLOAD_RABBITMQ => {
            env.insert("RABBITMQ_DEFAULT_USER".into(), rabbitmq.get_username().clone());
            env.insert("RABBITMQ_DEFAULT_PASS".into(), rabbitmq.get_password().clone());
            env.insert("RABBITMQ_DEFAULT_VHOST".into(), rabbitmq.get_vhost().clone());
        }
        WORKLOAD_METADATA_DATABASE => {
            env.insert("POSTGRES_USER".into(), db.get_user().clone());
            env.insert("POSTGRES_PASSWORD".into(), db.get_password().clone());
            env.insert("POSTGRES_DB".into(), db.get_db_name().clone());
        }
        _ => {}
    }

    env
}

fn db_env(db: &MetadataDatabase) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "METADATA_DB_URL".to_string(),
            format!(
                "jdbc:postgresql://{}:{}/{}",
                db.get_host(),
                db.get_port(),
                db.get_db_name()
            ),
        ),
        ("METADATA_DB_USER".to_string(), db.get_user().clone()),
        ("METADATA_DB_PASSWORD".to_string(), db.get_password().clone()),
    ])
}

fn broker_env(rabbitmq: &RabbitMq) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("BROKER_HOST".to_string(), rabbitmq.get_host().clone()),
        ("BROKER_USERNAME".to_string(), rabbitmq.get_username().clone()),
        ("BROKER_PASSWORD".to_string(), rabbitmq.get_password().clone()),
        ("BROKER_VHOST".to_string(), rabbitmq.get_vhost().clone()),
    ])
}

/// Joins the optional namespace prefix and a base path into an ingress path.
fn ingress_path(prefix: &str, base: &str) -> String {
    let joined = format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        base.trim_matches('/')
    );
    let trimmed = joined.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_helm_values_default_config() -> anyhow::Result<()> {
        let config = EnvironmentConfig::default_k8s("e2");
        let values = build_helm_values(&config)?;

        let gateway = values.workloads.get("gateway").unwrap();
        assert_eq!(gateway.port, GATEWAY_CONTAINER_PORT);
        assert_eq!(gateway.env.get("SECURITY_CODE").map(String::as_str), Some("changeme"));

        let db = values.workloads.get("metadata-database").unwrap();
        assert_eq!(
            db.volume.as_ref().map(|v| v.claim.as_str()),
            Some(VOLUME_METADATA_DATABASE)
        );

        assert!(!values.workloads.contains_key("email-sender-service"));
        assert_eq!(values.ingress.api_path, "/api/v1");
        assert_eq!(values.ingress.gui_path, "/");
        assert_eq!(values.ingress.backoffice_path, "/backoffice");
        assert_eq!(values.ingress.host, "");
        assert!(values.jobs.initialiser.enabled);
        assert!(values.jobs.populator.enabled);
        assert_eq!(values.config, config);

        Ok(())
    }

    #[test]
    fn test_build_helm_values_prefix_and_tls() -> anyhow::Result<()> {
        let config: EnvironmentConfig = serde_yaml::from_str(
            r#"
            name: e2
            domain: epos.example.org
            k8s:
              url_prefix_namespace: true
              tls_enabled: true
              image_pull_secret: regcred
            "#,
        )?;

        let values = build_helm_values(&config)?;
        assert_eq!(values.ingress.api_path, "/e2/api/v1");
        assert_eq!(values.ingress.gui_path, "/e2");
        assert_eq!(values.ingress.backoffice_path, "/e2/backoffice");
        assert_eq!(values.ingress.host, "epos.example.org");
        assert!(values.tls.enabled);
        assert_eq!(values.image_pull_secret, "regcred");

        Ok(())
    }

    #[test]
    fn test_values_yaml_round_trip() -> anyhow::Result<()> {
        let config = EnvironmentConfig::default_k8s("e2");
        let values = build_helm_values(&config)?;

        let text = serde_yaml::to_string(&values)?;
        let reloaded: HelmValues = serde_yaml::from_str(&text)?;
        assert_eq!(values, reloaded);
        assert_eq!(*reloaded.get_config(), config);

        Ok(())
    }

    #[tokio::test]
    async fn test_render_k8s_extracts_chart_and_values() -> anyhow::Result<()> {
        let config = EnvironmentConfig::default_k8s("e2");
        let bundle = render_k8s(&config).await?;

        assert!(bundle.file("chart/Chart.yaml").exists());
        assert!(bundle.file("chart/templates/deployments.yaml").exists());
        assert!(bundle.file("chart/templates/ingress.yaml").exists());
        assert!(bundle.file(VALUES_FILENAME).exists());
        assert!(bundle.file(CONFIG_FILENAME).exists());

        let text = std::fs::read_to_string(bundle.file(VALUES_FILENAME))?;
        let values: HelmValues = serde_yaml::from_str(&text)?;
        assert_eq!(*values.get_config(), config);

        Ok(())
    }
}
