//! Environment configuration validation.

use std::collections::HashMap;

use crate::{EposctlError, EposctlResult};

use super::env_config::EnvironmentConfig;

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl EnvironmentConfig {
    /// Performs comprehensive validation of the configuration document.
    ///
    /// This is the single gate every mutating operation passes through before
    /// touching any substrate. Violations are collected rather than
    /// short-circuited, one `<field>: <reason>` entry per offending field.
    pub fn validate(&self) -> EposctlResult<()> {
        let mut errors = Vec::new();

        self.validate_identity(&mut errors);
        self.validate_gateway(&mut errors);
        self.validate_ports(&mut errors);
        self.validate_resources(&mut errors);
        self.validate_email_sender(&mut errors);
        self.validate_rabbitmq(&mut errors);
        self.validate_metadata_database(&mut errors);
        self.validate_images(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EposctlError::ConfigValidation(errors))
        }
    }

    /// Checks the environment name and URL-building fields.
    fn validate_identity(&self, errors: &mut Vec<String>) {
        if self.name.is_empty() {
            errors.push("name: must not be empty".to_string());
        } else if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            errors.push(format!(
                "name: `{}` may only contain letters, digits, `.`, `_`, and `-`",
                self.name
            ));
        }

        if self.domain.is_empty() {
            errors.push("domain: must not be empty".to_string());
        }
    }

    /// Checks the gateway base path and AAI settings.
    fn validate_gateway(&self, errors: &mut Vec<String>) {
        let gateway = &self.components.gateway;

        if !gateway.base_url.ends_with("/api/v1") {
            errors.push(format!(
                "components.gateway.base_url: `{}` must end with `/api/v1`",
                gateway.base_url
            ));
        }

        if gateway.aai.enabled {
            if gateway.aai.endpoint.is_empty() {
                errors.push(
                    "components.gateway.aai.endpoint: required when aai is enabled".to_string(),
                );
            }
            if gateway.aai.key.is_empty() {
                errors
                    .push("components.gateway.aai.key: required when aai is enabled".to_string());
            }
        }
    }

    /// Checks that published ports are usable and pairwise distinct.
    fn validate_ports(&self, errors: &mut Vec<String>) {
        let mut seen: HashMap<u16, &str> = HashMap::new();
        let mut published = vec![
            (
                self.components.platform_gui.port,
                "components.platform_gui.port",
            ),
            (self.components.gateway.port, "components.gateway.port"),
        ];
        if self.components.backoffice.enabled {
            published.push((
                self.components.backoffice.gui.port,
                "components.backoffice.gui.port",
            ));
        }

        for (port, field) in published {
            if port == 0 {
                errors.push(format!("{}: must not be zero", field));
                continue;
            }
            if let Some(previous) = seen.insert(port, field) {
                errors.push(format!("{}: port {} already used by {}", field, port, previous));
            }
        }
    }

    /// Checks the resources service settings.
    fn validate_resources(&self, errors: &mut Vec<String>) {
        if self.components.resources_service.cache_ttl == 0 {
            errors.push("components.resources_service.cache_ttl: must be positive".to_string());
        }

        if self.components.ingestor_service.hash.is_empty() {
            errors.push("components.ingestor_service.hash: must not be empty".to_string());
        }
    }

    /// Checks the email sender settings when the workload is enabled.
    fn validate_email_sender(&self, errors: &mut Vec<String>) {
        let email = &self.components.email_sender_service;
        if !email.enabled {
            return;
        }

        if email.mail_type != "API" {
            errors.push(format!(
                "components.email_sender_service.mail_type: `{}` is not supported, only `API`",
                email.mail_type
            ));
        }
        if !email.sender_email.contains('@') {
            errors.push(format!(
                "components.email_sender_service.sender_email: `{}` is not an address",
                email.sender_email
            ));
        }
        if email.mail_api_key.is_empty() {
            errors.push(
                "components.email_sender_service.mail_api_key: required when enabled".to_string(),
            );
        }
        if email.mail_api_secret.is_empty() {
            errors.push(
                "components.email_sender_service.mail_api_secret: required when enabled"
                    .to_string(),
            );
        }
    }

    /// Checks the RabbitMQ broker settings.
    fn validate_rabbitmq(&self, errors: &mut Vec<String>) {
        let rabbitmq = &self.components.rabbitmq;

        for (value, field) in [
            (&rabbitmq.host, "components.rabbitmq.host"),
            (&rabbitmq.username, "components.rabbitmq.username"),
            (&rabbitmq.password, "components.rabbitmq.password"),
            (&rabbitmq.vhost, "components.rabbitmq.vhost"),
        ] {
            if value.is_empty() {
                errors.push(format!("{}: must not be empty", field));
            }
        }
    }

    /// Checks the metadata database settings, including pool ordering.
    fn validate_metadata_database(&self, errors: &mut Vec<String>) {
        let db = &self.components.metadata_database;

        for (value, field) in [
            (&db.user, "components.metadata_database.user"),
            (&db.password, "components.metadata_database.password"),
            (&db.host, "components.metadata_database.host"),
            (&db.db_name, "components.metadata_database.db_name"),
        ] {
            if value.is_empty() {
                errors.push(format!("{}: must not be empty", field));
            }
        }

        if db.port == 0 {
            errors.push("components.metadata_database.port: must not be zero".to_string());
        }

        let pool = &db.pool;
        for (value, field) in [
            (pool.init, "components.metadata_database.pool.init"),
            (pool.min, "components.metadata_database.pool.min"),
            (pool.max, "components.metadata_database.pool.max"),
        ] {
            if value == 0 {
                errors.push(format!("{}: must be positive", field));
            }
        }
        if pool.init > pool.min {
            errors.push(format!(
                "components.metadata_database.pool.init: {} exceeds min {}",
                pool.init, pool.min
            ));
        }
        if pool.min > pool.max {
            errors.push(format!(
                "components.metadata_database.pool.min: {} exceeds max {}",
                pool.min, pool.max
            ));
        }
    }

    /// Checks that every enabled workload has an image reference.
    fn validate_images(&self, errors: &mut Vec<String>) {
        for workload in self.enabled_workloads() {
            if !self.images.contains_key(workload) {
                errors.push(format!("images.{}: missing image reference", workload));
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    mod fixtures {
        use super::*;

        pub(super) fn valid() -> EnvironmentConfig {
            EnvironmentConfig::default_docker("e1")
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        fixtures::valid().validate().expect("default config validates");
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let mut config = fixtures::valid();
        config.name = String::new();

        let err = config.validate().unwrap_err();
        match err {
            EposctlError::ConfigValidation(errors) => {
                assert!(errors.iter().any(|e| e.starts_with("name:")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_name_with_slash_is_rejected() {
        let mut config = fixtures::valid();
        config.name = "a/b".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gateway_base_url_must_end_with_api_v1() {
        let mut config = fixtures::valid();
        config.components.gateway.base_url = "/api/v2".to_string();

        let err = config.validate().unwrap_err();
        assert!(err
            .to_string()
            .contains("components.gateway.base_url"));
    }

    #[test]
    fn test_pool_ordering_is_enforced() {
        let mut config = fixtures::valid();
        config.components.metadata_database.pool.init = 30;
        config.components.metadata_database.pool.min = 10;
        config.components.metadata_database.pool.max = 5;

        let err = config.validate().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("pool.init"));
        assert!(text.contains("pool.min"));
    }

    #[test]
    fn test_duplicate_ports_are_rejected() {
        let mut config = fixtures::valid();
        config.components.gateway.port = 32000;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("already used"));
    }

    #[test]
    fn test_enabled_email_sender_requires_credentials() {
        let mut config = fixtures::valid();
        config.components.email_sender_service.enabled = true;

        let err = config.validate().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("mail_api_key"));
        assert!(text.contains("mail_api_secret"));

        config.components.email_sender_service.mail_api_key = "key".to_string();
        config.components.email_sender_service.mail_api_secret = "secret".to_string();
        config.validate().expect("credentials satisfy the gate");
    }

    #[test]
    fn test_missing_image_for_enabled_workload_is_rejected() {
        let mut config = fixtures::valid();
        config.images.remove("gateway");

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("images.gateway"));
    }

    #[test]
    fn test_disabled_workload_does_not_require_image() {
        let mut config = fixtures::valid();
        config.components.sharing_service.enabled = false;
        config.images.remove("sharing_service");

        config.validate().expect("disabled workloads need no image");
    }
}
