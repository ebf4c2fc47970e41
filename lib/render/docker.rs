//! Rendering of the Docker Compose artifact set.
//!
//! A compose skeleton is rendered through [`tera`] for component gating,
//! then every `${VAR}` reference is resolved from an explicit map built off
//! the configuration, so the installed document is self-contained.

use std::collections::BTreeMap;

use tera::{Context, Tera};
use tracing::debug;

use crate::{
    config::{build_docker_urls, EnvironmentConfig, GATEWAY_CONTAINER_PORT, SECURITY_CODE},
    utils::{COMPOSE_FILENAME, CONFIG_FILENAME, ENV_FILENAME},
    EposctlResult,
};

use super::{expand, DeploymentBundle};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Template producing the compose document skeleton.
const TEMPLATE_COMPOSE: &str = "docker-compose.yaml.j2";

/// Template producing the `.env` file.
const TEMPLATE_ENV: &str = "env.j2";

/// All embedded templates as (name, content) pairs for registration with Tera.
const TEMPLATES: &[(&str, &str)] = &[
    (TEMPLATE_COMPOSE, include_str!("templates/docker-compose.yaml.j2")),
    (TEMPLATE_ENV, include_str!("templates/env.j2")),
];

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Renders the Docker artifact set for `config` into a fresh bundle.
///
/// The bundle holds `docker-compose.yaml` with every variable expanded, the
/// matching `.env` file, and a verbatim copy of the configuration document.
pub async fn render_docker(config: &EnvironmentConfig) -> EposctlResult<DeploymentBundle> {
    let bundle = DeploymentBundle::new()?;
    let tera = compose_renderer()?;
    let vars = expansion_map(config);

    let components = config.get_components();
    let mut context = Context::new();
    context.insert("name", config.get_name());
    context.insert(
        "backoffice_enabled",
        components.get_backoffice().get_enabled(),
    );
    context.insert("converter_enabled", components.get_converter().get_enabled());
    context.insert(
        "sharing_enabled",
        components.get_sharing_service().get_enabled(),
    );
    context.insert(
        "email_enabled",
        components.get_email_sender_service().get_enabled(),
    );
    context.insert("monitoring_enabled", &config.get_monitoring().is_some());

    let skeleton = tera.render(TEMPLATE_COMPOSE, &context)?;
    let compose = expand(&skeleton, &vars)?;
    tokio::fs::write(bundle.file(COMPOSE_FILENAME), compose).await?;

    let pairs: Vec<(&String, &String)> = vars.iter().collect();
    let mut env_context = Context::new();
    env_context.insert("name", config.get_name());
    env_context.insert("vars", &pairs);
    let env_file = tera.render(TEMPLATE_ENV, &env_context)?;
    tokio::fs::write(bundle.file(ENV_FILENAME), env_file).await?;

    config.save(bundle.file(CONFIG_FILENAME)).await?;

    debug!(
        "rendered docker artifacts for '{}' ({} variables)",
        config.get_name(),
        vars.len()
    );

    Ok(bundle)
}

/// Builds the variable map the compose template is expanded against.
pub fn expansion_map(config: &EnvironmentConfig) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    let components = config.get_components();
    let urls = build_docker_urls(config);

    {
        let mut put = |key: &str, value: String| {
            vars.insert(key.to_string(), value);
        };

        put("ENV_NAME", config.get_name().clone());
        put("DOMAIN", config.get_domain().clone());
        put("PROTOCOL", config.get_protocol().as_str().to_string());

        let gui = components.get_platform_gui();
        let gateway = components.get_gateway();
        let backoffice = components.get_backoffice();

        put("GUI_PORT", gui.get_port().to_string());
        put("GATEWAY_PORT", gateway.get_port().to_string());
        put(
            "GATEWAY_CONTAINER_PORT",
            GATEWAY_CONTAINER_PORT.to_string(),
        );
        put(
            "BACKOFFICE_PORT",
            backoffice.get_gui().get_port().to_string(),
        );

        put("GUI_URL", urls.get_gui().clone());
        put("API_URL", urls.get_api().clone());
        put(
            "BACKOFFICE_URL",
            urls.get_backoffice().clone().unwrap_or_default(),
        );
        put("GUI_BASE_PATH", base_path(gui.get_base_url()));
        put("API_BASE_PATH", base_path(gateway.get_base_url()));
        put(
            "BACKOFFICE_BASE_PATH",
            base_path(backoffice.get_gui().get_base_url()),
        );

        put("SECURITY_CODE", SECURITY_CODE.to_string());

        let aai = gateway.get_aai();
        put("AAI_ENABLED", aai.get_enabled().to_string());
        put("AAI_ENDPOINT", aai.get_endpoint().clone());
        put("AAI_KEY", aai.get_key().clone());

        let swagger = gateway.get_swagger();
        put("SWAGGER_TITLE", swagger.get_title().clone());
        put("SWAGGER_DESCRIPTION", swagger.get_description().clone());

        put(
            "BACKOFFICE_SERVICE_AUTH",
            backoffice.get_service().get_auth().to_string(),
        );
        put(
            "CONVERTER_AUTH",
            components.get_converter().get_auth().to_string(),
        );

        let resources = components.get_resources_service();
        put("RESOURCES_SERVICE_AUTH", resources.get_auth().to_string());
        put("RESOURCES_CACHE_TTL", resources.get_cache_ttl().to_string());

        let ingestor = components.get_ingestor_service();
        put("INGESTOR_SERVICE_AUTH", ingestor.get_auth().to_string());
        put("INGESTOR_HASH", ingestor.get_hash().clone());

        put(
            "EXTERNAL_ACCESS_AUTH",
            components.get_external_access_service().get_auth().to_string(),
        );
        put(
            "SHARING_SERVICE_AUTH",
            components.get_sharing_service().get_auth().to_string(),
        );

        let email = components.get_email_sender_service();
        put(
            "EMAIL_ENVIRONMENT_TYPE",
            email.get_environment_type().as_str().to_string(),
        );
        put("EMAIL_MAIL_TYPE", email.get_mail_type().clone());
        put("EMAIL_SENDER_NAME", email.get_sender_name().clone());
        put("EMAIL_SENDER_EMAIL", email.get_sender_email().clone());
        put("EMAIL_MAIL_API_KEY", email.get_mail_api_key().clone());
        put("EMAIL_MAIL_API_SECRET", email.get_mail_api_secret().clone());

        let rabbitmq = components.get_rabbitmq();
        put("RABBITMQ_HOST", rabbitmq.get_host().clone());
        put("RABBITMQ_USERNAME", rabbitmq.get_username().clone());
        put("RABBITMQ_PASSWORD", rabbitmq.get_password().clone());
        put("RABBITMQ_VHOST", rabbitmq.get_vhost().clone());

        let db = components.get_metadata_database();
        put("METADATA_DB_HOST", db.get_host().clone());
        put("METADATA_DB_PORT", db.get_port().to_string());
        put("METADATA_DB_NAME", db.get_db_name().clone());
        put("METADATA_DB_USER", db.get_user().clone());
        put("METADATA_DB_PASSWORD", db.get_password().clone());
        put(
            "METADATA_DB_URL",
            format!(
                "jdbc:postgresql://{}:{}/{}",
                db.get_host(),
                db.get_port(),
                db.get_db_name()
            ),
        );

        let pool = db.get_pool();
        put("METADATA_DB_POOL_INIT", pool.get_init().to_string());
        put("METADATA_DB_POOL_MIN", pool.get_min().to_string());
        put("METADATA_DB_POOL_MAX", pool.get_max().to_string());

        let monitoring = config.get_monitoring().clone().unwrap_or_default();
        put(
            "MONITORING_URL",
            monitoring.get_url().clone().unwrap_or_default(),
        );
        put(
            "MONITORING_USER",
            monitoring.get_user().clone().unwrap_or_default(),
        );
        put(
            "MONITORING_PASSWORD",
            monitoring.get_password().clone().unwrap_or_default(),
        );
    }

    for (workload, image) in config.get_images() {
        vars.insert(
            format!("IMAGE_{}", workload.to_uppercase()),
            image.to_string(),
        );
    }

    vars
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn compose_renderer() -> EposctlResult<Tera> {
    let mut tera = Tera::default();
    for (name, content) in TEMPLATES {
        tera.add_raw_template(name, content)?;
    }
    Ok(tera)
}

/// Normalises a base path for use as a compose value. An empty base means
/// the component is served at the root.
fn base_path(base: &str) -> String {
    let trimmed = base.trim_end_matches('/');
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

    #[tokio::test]
    async fn test_render_docker_produces_expanded_artifacts() -> anyhow::Result<()> {
        let config = EnvironmentConfig::default_docker("e1");
        let bundle = render_docker(&config).await?;

        let compose = std::fs::read_to_string(bundle.file(COMPOSE_FILENAME))?;
        assert!(compose.contains("name: e1"));
        assert!(compose.contains("gateway:"));
        assert!(compose.contains("backoffice-ui:"));
        assert!(compose.contains("converter-routine:"));
        assert!(!compose.contains("email-sender-service:"));
        assert!(compose.contains("\"33000:5000\""));
        assert!(compose.contains("image: epos/gateway:1.3.0"));
        assert!(!compose.contains("${"), "unexpanded variable left behind");

        let env = std::fs::read_to_string(bundle.file(ENV_FILENAME))?;
        assert!(env.contains("GATEWAY_PORT=33000"));
        assert!(env.contains("SECURITY_CODE=changeme"));

        let saved = EnvironmentConfig::from_file(bundle.file(CONFIG_FILENAME)).await?;
        assert_eq!(saved, config);

        Ok(())
    }

    #[tokio::test]
    async fn test_render_docker_honours_component_gates() -> anyhow::Result<()> {
        let config: EnvironmentConfig = serde_yaml::from_str(
            r#"
            name: e1
            components:
              backoffice:
                enabled: false
              converter:
                enabled: false
              sharing_service:
                enabled: false
            "#,
        )?;

        let bundle = render_docker(&config).await?;
        let compose = std::fs::read_to_string(bundle.file(COMPOSE_FILENAME))?;

        assert!(!compose.contains("backoffice-ui:"));
        assert!(!compose.contains("backoffice-service:"));
        assert!(!compose.contains("converter-service:"));
        assert!(!compose.contains("sharing-service:"));
        assert!(compose.contains("resources-service:"));

        Ok(())
    }

    #[test]
    fn test_expansion_map_covers_every_image() {
        let config = EnvironmentConfig::default_docker("e1");
        let vars = expansion_map(&config);

        for (workload, _) in crate::config::DEFAULT_IMAGE_REFS {
            let key = format!("IMAGE_{}", workload.to_uppercase());
            assert!(vars.contains_key(&key), "missing {key}");
        }
        assert_eq!(vars.get("METADATA_DB_POOL_MAX").map(String::as_str), Some("20"));
    }
}
