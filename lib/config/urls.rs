//! Deterministic construction of an environment's user-facing URLs.

use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use super::env_config::EnvironmentConfig;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The user-facing URLs of a deployed environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct EnvUrls {
    /// URL of the platform GUI.
    pub(crate) gui: String,

    /// URL of the public API. Never carries a trailing slash.
    pub(crate) api: String,

    /// URL of the backoffice UI, when the backoffice is enabled.
    #[builder(default)]
    pub(crate) backoffice: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl EnvUrls {
    /// The endpoint TTL files are POSTed to.
    pub fn ingest_endpoint(&self) -> &str {
        &self.api
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Builds the GUI, API, and optional backoffice URLs of a Docker environment
/// from scheme, domain, and the published component ports.
pub fn build_docker_urls(config: &EnvironmentConfig) -> EnvUrls {
    let scheme = config.get_protocol().as_str();
    let domain = config.get_domain();
    let components = config.get_components();

    let gui_port = components.get_platform_gui().get_port();
    let gui = join_url(
        &format!("{}://{}:{}", scheme, domain, gui_port),
        components.get_platform_gui().get_base_url(),
    );

    let api_port = components.get_gateway().get_port();
    let api = join_url(
        &format!("{}://{}:{}", scheme, domain, api_port),
        components.get_gateway().get_base_url(),
    );

    let backoffice = components.get_backoffice().get_enabled().then(|| {
        let port = components.get_backoffice().get_gui().get_port();
        join_url(
            &format!("{}://{}:{}", scheme, domain, port),
            components.get_backoffice().get_gui().get_base_url(),
        )
    });

    EnvUrls { gui, api, backoffice }
}

/// Builds the URLs of a Kubernetes environment from the ingress-derived host
/// and the configured base paths. When `url_prefix_namespace` is set, the
/// environment name is prepended to every path.
pub fn build_k8s_urls(config: &EnvironmentConfig, ingress_host: &str) -> EnvUrls {
    let settings = config.k8s_settings();
    let scheme = if *settings.get_tls_enabled() {
        "https"
    } else {
        config.get_protocol().as_str()
    };

    let prefix = if *settings.get_url_prefix_namespace() {
        format!("/{}", config.get_name())
    } else {
        String::new()
    };

    let root = format!("{}://{}{}", scheme, ingress_host, prefix);
    let components = config.get_components();

    let gui = join_url(&root, components.get_platform_gui().get_base_url());
    let api = join_url(&root, components.get_gateway().get_base_url());
    let backoffice = components
        .get_backoffice()
        .get_enabled()
        .then(|| join_url(&root, components.get_backoffice().get_gui().get_base_url()));

    EnvUrls { gui, api, backoffice }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Joins a root and a base path, trimming trailing slashes. Downstream
/// services reject API URLs that end with `/`.
fn join_url(root: &str, base: &str) -> String {
    let mut url = String::with_capacity(root.len() + base.len());
    url.push_str(root);

    let trimmed = base.trim_end_matches('/');
    if !trimmed.is_empty() && !trimmed.starts_with('/') {
        url.push('/');
    }
    url.push_str(trimmed);

    url.trim_end_matches('/').to_string()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docker_urls_default_ports() {
        let config = EnvironmentConfig::default_docker("e1");
        let urls = build_docker_urls(&config);

        assert_eq!(urls.get_gui(), "http://localhost:32000");
        assert_eq!(urls.get_api(), "http://localhost:33000/api/v1");
        assert_eq!(
            urls.get_backoffice().as_deref(),
            Some("http://localhost:34000/backoffice")
        );
    }

    #[test]
    fn test_docker_urls_disabled_backoffice() {
        let mut config = EnvironmentConfig::default_docker("e1");
        config.components.backoffice.enabled = false;

        let urls = build_docker_urls(&config);
        assert!(urls.get_backoffice().is_none());
    }

    #[test]
    fn test_api_url_never_ends_with_slash() {
        let mut config = EnvironmentConfig::default_docker("e1");
        config.components.gateway.base_url = "/api/v1/".to_string();

        let urls = build_docker_urls(&config);
        assert_eq!(urls.get_api(), "http://localhost:33000/api/v1");
    }

    #[test]
    fn test_k8s_urls_without_prefix() {
        let config = EnvironmentConfig::default_k8s("e2");
        let urls = build_k8s_urls(&config, "203.0.113.10");

        assert_eq!(urls.get_gui(), "http://203.0.113.10");
        assert_eq!(urls.get_api(), "http://203.0.113.10/api/v1");
    }

    #[test]
    fn test_k8s_urls_with_namespace_prefix_and_tls() {
        let mut config = EnvironmentConfig::default_k8s("e2");
        if let Some(k8s) = config.k8s.as_mut() {
            k8s.url_prefix_namespace = true;
            k8s.tls_enabled = true;
        }

        let urls = build_k8s_urls(&config, "epos.example.org");
        assert_eq!(urls.get_gui(), "https://epos.example.org/e2");
        assert_eq!(urls.get_api(), "https://epos.example.org/e2/api/v1");
        assert_eq!(
            urls.get_backoffice().as_deref(),
            Some("https://epos.example.org/e2/backoffice")
        );
    }
}
