//! The environment configuration document and its component types.

use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    path::Path,
};

use getset::Getters;
use oci_spec::distribution::Reference;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use typed_builder::TypedBuilder;

use super::{
    default_images, DEFAULT_BACKOFFICE_PORT, DEFAULT_DOMAIN, DEFAULT_GATEWAY_PORT,
    DEFAULT_GUI_PORT,
};

use crate::EposctlResult;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Workload id of the platform GUI.
pub const WORKLOAD_PLATFORM_GUI: &str = "platform_gui";

/// Workload id of the API gateway.
pub const WORKLOAD_GATEWAY: &str = "gateway";

/// Workload id of the backoffice UI.
pub const WORKLOAD_BACKOFFICE_GUI: &str = "backoffice_gui";

/// Workload id of the backoffice service.
pub const WORKLOAD_BACKOFFICE_SERVICE: &str = "backoffice_service";

/// Workload id of the converter service.
pub const WORKLOAD_CONVERTER_SERVICE: &str = "converter_service";

/// Workload id of the converter routine.
pub const WORKLOAD_CONVERTER_ROUTINE: &str = "converter_routine";

/// Workload id of the resources service.
pub const WORKLOAD_RESOURCES_SERVICE: &str = "resources_service";

/// Workload id of the ingestor service.
pub const WORKLOAD_INGESTOR_SERVICE: &str = "ingestor_service";

/// Workload id of the external access service.
pub const WORKLOAD_EXTERNAL_ACCESS_SERVICE: &str = "external_access_service";

/// Workload id of the sharing service.
pub const WORKLOAD_SHARING_SERVICE: &str = "sharing_service";

/// Workload id of the email sender service.
pub const WORKLOAD_EMAIL_SENDER_SERVICE: &str = "email_sender_service";

/// Workload id of the RabbitMQ broker.
pub const WORKLOAD_RABBITMQ: &str = "rabbitmq";

/// Workload id of the metadata database.
pub const WORKLOAD_METADATA_DATABASE: &str = "metadata_database";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The authoritative declarative document describing one EPOS environment.
///
/// A partial YAML document loads into a fully defaulted configuration; every
/// field carries a serde default so `export` followed by selective editing
/// is the expected workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct EnvironmentConfig {
    /// The environment name, unique per substrate. Matches `[A-Za-z0-9._-]+`.
    #[serde(default)]
    #[builder(setter(transform = |name: impl AsRef<str>| name.as_ref().to_string()))]
    pub(super) name: String,

    /// The host used to build user-facing URLs.
    #[serde(default = "EnvironmentConfig::default_domain")]
    #[builder(default = EnvironmentConfig::default_domain())]
    pub(super) domain: String,

    /// The scheme used to build user-facing URLs.
    #[serde(default)]
    #[builder(default)]
    pub(super) protocol: Protocol,

    /// Settings of the closed set of stack components.
    #[serde(default)]
    #[builder(default)]
    pub(super) components: Components,

    /// Container image references keyed by workload id.
    #[serde(default = "default_images")]
    #[builder(default = default_images())]
    pub(super) images: BTreeMap<String, Reference>,

    /// Optional coordinates of an external observability stack.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[builder(default)]
    pub(super) monitoring: Option<Monitoring>,

    /// Kubernetes-specific extensions; absent in Docker documents.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[builder(default)]
    pub(super) k8s: Option<K8sSettings>,
}

/// The scheme of user-facing URLs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain HTTP.
    #[default]
    Http,
    /// HTTP over TLS.
    Https,
}

/// Settings of the closed set of stack components.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Components {
    /// The platform GUI.
    #[serde(default)]
    pub(super) platform_gui: PlatformGui,

    /// The API gateway.
    #[serde(default)]
    pub(super) gateway: Gateway,

    /// The backoffice UI and service pair.
    #[serde(default)]
    pub(super) backoffice: Backoffice,

    /// The converter service and routine pair.
    #[serde(default)]
    pub(super) converter: Converter,

    /// The resources service.
    #[serde(default)]
    pub(super) resources_service: ResourcesService,

    /// The ingestor service.
    #[serde(default)]
    pub(super) ingestor_service: IngestorService,

    /// The external access service.
    #[serde(default)]
    pub(super) external_access_service: ExternalAccessService,

    /// The sharing service.
    #[serde(default)]
    pub(super) sharing_service: SharingService,

    /// The email sender service.
    #[serde(default)]
    pub(super) email_sender_service: EmailSenderService,

    /// The RabbitMQ broker.
    #[serde(default)]
    pub(super) rabbitmq: RabbitMq,

    /// The metadata database.
    #[serde(default)]
    pub(super) metadata_database: MetadataDatabase,
}

/// The platform GUI component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct PlatformGui {
    /// Base path the GUI is served under.
    #[serde(default)]
    pub(super) base_url: String,

    /// Published port of the GUI.
    #[serde(default = "PlatformGui::default_port")]
    pub(super) port: u16,
}

/// The API gateway component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Gateway {
    /// Base path of the public API. Must end with `/api/v1`.
    #[serde(default = "Gateway::default_base_url")]
    pub(super) base_url: String,

    /// Published port of the gateway.
    #[serde(default = "Gateway::default_port")]
    pub(super) port: u16,

    /// Authentication/authorisation infrastructure settings.
    #[serde(default)]
    pub(super) aai: Aai,

    /// Metadata shown on the gateway's swagger UI.
    #[serde(default)]
    pub(super) swagger: Swagger,
}

/// AAI settings of the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Aai {
    /// Whether requests are authenticated against an AAI service.
    #[serde(default)]
    pub(super) enabled: bool,

    /// Endpoint of the AAI service.
    #[serde(default)]
    pub(super) endpoint: String,

    /// API key presented to the AAI service.
    #[serde(default)]
    pub(super) key: String,
}

/// Swagger UI metadata of the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Swagger {
    /// Title shown on the swagger UI.
    #[serde(default = "Swagger::default_title")]
    pub(super) title: String,

    /// Description shown on the swagger UI.
    #[serde(default = "Swagger::default_description")]
    pub(super) description: String,
}

/// The backoffice UI and service pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Backoffice {
    /// Whether the backoffice workloads are part of the stack.
    #[serde(default = "default_true")]
    pub(super) enabled: bool,

    /// The backoffice UI.
    #[serde(default)]
    pub(super) gui: BackofficeGui,

    /// The backoffice service.
    #[serde(default)]
    pub(super) service: BackofficeService,
}

/// The backoffice UI settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct BackofficeGui {
    /// Base path the backoffice UI is served under.
    #[serde(default = "BackofficeGui::default_base_url")]
    pub(super) base_url: String,

    /// Published port of the backoffice UI.
    #[serde(default = "BackofficeGui::default_port")]
    pub(super) port: u16,
}

/// The backoffice service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct BackofficeService {
    /// Whether the service authenticates its callers.
    #[serde(default = "default_true")]
    pub(super) auth: bool,
}

/// The converter service and routine pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Converter {
    /// Whether the converter workloads are part of the stack.
    #[serde(default = "default_true")]
    pub(super) enabled: bool,

    /// Whether the converter authenticates its callers.
    #[serde(default = "default_true")]
    pub(super) auth: bool,
}

/// The resources service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ResourcesService {
    /// Whether the service authenticates its callers.
    #[serde(default = "default_true")]
    pub(super) auth: bool,

    /// Cache time-to-live in seconds. Must be positive.
    #[serde(default = "ResourcesService::default_cache_ttl")]
    pub(super) cache_ttl: u64,
}

/// The ingestor service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct IngestorService {
    /// Whether the service authenticates its callers.
    #[serde(default = "default_true")]
    pub(super) auth: bool,

    /// Hash algorithm used to derive ingested entity identifiers.
    #[serde(default = "IngestorService::default_hash")]
    pub(super) hash: String,
}

/// The external access service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ExternalAccessService {
    /// Whether the service authenticates its callers.
    #[serde(default = "default_true")]
    pub(super) auth: bool,
}

/// The sharing service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct SharingService {
    /// Whether the sharing workload is part of the stack.
    #[serde(default = "default_true")]
    pub(super) enabled: bool,

    /// Whether the service authenticates its callers.
    #[serde(default = "default_true")]
    pub(super) auth: bool,
}

/// The email sender service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct EmailSenderService {
    /// Whether the email sender workload is part of the stack.
    #[serde(default)]
    pub(super) enabled: bool,

    /// Deployment flavour reported in outgoing mail.
    #[serde(default)]
    pub(super) environment_type: EnvironmentType,

    /// Mail transport. Only `API` is supported.
    #[serde(default = "EmailSenderService::default_mail_type")]
    pub(super) mail_type: String,

    /// Display name of the sender.
    #[serde(default = "EmailSenderService::default_sender_name")]
    pub(super) sender_name: String,

    /// Address of the sender.
    #[serde(default = "EmailSenderService::default_sender_email")]
    pub(super) sender_email: String,

    /// API key of the mail provider.
    #[serde(default)]
    pub(super) mail_api_key: String,

    /// API secret of the mail provider.
    #[serde(default)]
    pub(super) mail_api_secret: String,
}

/// Deployment flavour of the email sender.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentType {
    /// Development deployment.
    #[default]
    Development,
    /// Staging deployment.
    Staging,
    /// Production deployment.
    Production,
}

/// The RabbitMQ broker settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct RabbitMq {
    /// Hostname of the broker inside the stack network.
    #[serde(default = "RabbitMq::default_host")]
    pub(super) host: String,

    /// Broker username.
    #[serde(default = "RabbitMq::default_username")]
    pub(super) username: String,

    /// Broker password.
    #[serde(default = "RabbitMq::default_password")]
    pub(super) password: String,

    /// Virtual host the stack publishes to.
    #[serde(default = "RabbitMq::default_vhost")]
    pub(super) vhost: String,
}

/// The metadata database settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct MetadataDatabase {
    /// Database username.
    #[serde(default = "MetadataDatabase::default_user")]
    pub(super) user: String,

    /// Database password.
    #[serde(default = "MetadataDatabase::default_password")]
    pub(super) password: String,

    /// Hostname of the database inside the stack network.
    #[serde(default = "MetadataDatabase::default_host")]
    pub(super) host: String,

    /// Port of the database inside the stack network.
    #[serde(default = "MetadataDatabase::default_port")]
    pub(super) port: u16,

    /// Name of the metadata catalogue database.
    #[serde(default = "MetadataDatabase::default_db_name")]
    pub(super) db_name: String,

    /// Connection pool sizing.
    #[serde(default)]
    pub(super) pool: DbPool,
}

/// Connection pool sizing of the metadata database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct DbPool {
    /// Connections opened at startup.
    #[serde(default = "DbPool::default_init")]
    pub(super) init: u32,

    /// Minimum pool size. At least `init`.
    #[serde(default = "DbPool::default_min")]
    pub(super) min: u32,

    /// Maximum pool size. At least `min`.
    #[serde(default = "DbPool::default_max")]
    pub(super) max: u32,
}

/// Coordinates of an external observability stack.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Monitoring {
    /// Endpoint metrics are shipped to.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub(super) url: Option<String>,

    /// Username for the monitoring endpoint.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub(super) user: Option<String>,

    /// Password for the monitoring endpoint.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub(super) password: Option<String>,
}

/// Kubernetes-specific extensions of the configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct K8sSettings {
    /// Whether the ingress terminates TLS.
    #[serde(default)]
    pub(super) tls_enabled: bool,

    /// Whether the environment name is prepended to every ingress path.
    #[serde(default)]
    pub(super) url_prefix_namespace: bool,

    /// Name of an image-pull secret already present in the target namespace.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub(super) image_pull_secret: Option<String>,

    /// Whether the metadata populator job runs on install.
    #[serde(default = "default_true")]
    pub(super) populator_job: bool,

    /// Whether the database initialisation job runs on install.
    #[serde(default = "default_true")]
    pub(super) initialiser_job: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl EnvironmentConfig {
    /// Creates the default configuration for a Docker environment.
    pub fn default_docker(name: impl AsRef<str>) -> Self {
        EnvironmentConfig::builder().name(name).build()
    }

    /// Creates the default configuration for a Kubernetes environment.
    pub fn default_k8s(name: impl AsRef<str>) -> Self {
        EnvironmentConfig::builder()
            .name(name)
            .k8s(Some(K8sSettings::default()))
            .build()
    }

    /// Loads a configuration document from a YAML file.
    pub async fn from_file(path: impl AsRef<Path>) -> EposctlResult<Self> {
        let contents = tokio::fs::read_to_string(path.as_ref()).await?;
        let config: EnvironmentConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Serialises the configuration to a YAML string.
    pub fn to_yaml(&self) -> EposctlResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Saves the configuration document to a YAML file, creating parent
    /// directories as needed.
    pub async fn save(&self, path: impl AsRef<Path>) -> EposctlResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.to_yaml()?).await?;
        Ok(())
    }

    /// Overwrites the environment name.
    pub fn set_name(&mut self, name: impl AsRef<str>) {
        self.name = name.as_ref().to_string();
    }

    /// Returns the Kubernetes extensions, defaulted when the document has none.
    pub fn k8s_settings(&self) -> K8sSettings {
        self.k8s.clone().unwrap_or_default()
    }

    /// Whether all published ports still carry their embedded defaults,
    /// meaning the user did not pick them explicitly.
    pub fn ports_are_default(&self) -> bool {
        self.components.platform_gui.port == DEFAULT_GUI_PORT
            && self.components.gateway.port == DEFAULT_GATEWAY_PORT
            && self.components.backoffice.gui.port == DEFAULT_BACKOFFICE_PORT
    }

    /// The workload ids that are part of the stack under this configuration,
    /// honouring the `enabled` gates.
    pub fn enabled_workloads(&self) -> Vec<&'static str> {
        let mut workloads = vec![
            WORKLOAD_PLATFORM_GUI,
            WORKLOAD_GATEWAY,
            WORKLOAD_RESOURCES_SERVICE,
            WORKLOAD_INGESTOR_SERVICE,
            WORKLOAD_EXTERNAL_ACCESS_SERVICE,
            WORKLOAD_RABBITMQ,
            WORKLOAD_METADATA_DATABASE,
        ];

        if self.components.backoffice.enabled {
            workloads.push(WORKLOAD_BACKOFFICE_GUI);
            workloads.push(WORKLOAD_BACKOFFICE_SERVICE);
        }
        if self.components.converter.enabled {
            workloads.push(WORKLOAD_CONVERTER_SERVICE);
            workloads.push(WORKLOAD_CONVERTER_ROUTINE);
        }
        if self.components.sharing_service.enabled {
            workloads.push(WORKLOAD_SHARING_SERVICE);
        }
        if self.components.email_sender_service.enabled {
            workloads.push(WORKLOAD_EMAIL_SENDER_SERVICE);
        }

        workloads
    }

    /// Lists the dotted paths of fields that differ between two configurations.
    pub fn diff(&self, other: &EnvironmentConfig) -> EposctlResult<Vec<String>> {
        let a = serde_yaml::to_value(self)?;
        let b = serde_yaml::to_value(other)?;

        let mut changed = Vec::new();
        diff_values("", &a, &b, &mut changed);
        Ok(changed)
    }

    fn default_domain() -> String {
        DEFAULT_DOMAIN.to_string()
    }
}

impl PlatformGui {
    fn default_port() -> u16 {
        DEFAULT_GUI_PORT
    }
}

impl Gateway {
    fn default_base_url() -> String {
        "/api/v1".to_string()
    }

    fn default_port() -> u16 {
        DEFAULT_GATEWAY_PORT
    }
}

impl Swagger {
    fn default_title() -> String {
        "EPOS API Gateway".to_string()
    }

    fn default_description() -> String {
        "EPOS ICS-C REST API".to_string()
    }
}

impl BackofficeGui {
    fn default_base_url() -> String {
        "/backoffice".to_string()
    }

    fn default_port() -> u16 {
        DEFAULT_BACKOFFICE_PORT
    }
}

impl ResourcesService {
    fn default_cache_ttl() -> u64 {
        300
    }
}

impl IngestorService {
    fn default_hash() -> String {
        "SHA-256".to_string()
    }
}

impl EmailSenderService {
    fn default_mail_type() -> String {
        "API".to_string()
    }

    fn default_sender_name() -> String {
        "EPOS Platform".to_string()
    }

    fn default_sender_email() -> String {
        "noreply@epos-eu.org".to_string()
    }
}

impl EnvironmentType {
    /// The wire value of the flavour.
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentType::Development => "development",
            EnvironmentType::Staging => "staging",
            EnvironmentType::Production => "production",
        }
    }
}

impl RabbitMq {
    fn default_host() -> String {
        "rabbitmq".to_string()
    }

    fn default_username() -> String {
        "epos".to_string()
    }

    fn default_password() -> String {
        "changeme".to_string()
    }

    fn default_vhost() -> String {
        "epos".to_string()
    }
}

impl MetadataDatabase {
    fn default_user() -> String {
        "epos".to_string()
    }

    fn default_password() -> String {
        "changeme".to_string()
    }

    fn default_host() -> String {
        "metadata-database".to_string()
    }

    fn default_port() -> u16 {
        5432
    }

    fn default_db_name() -> String {
        "epos".to_string()
    }
}

impl DbPool {
    fn default_init() -> u32 {
        5
    }

    fn default_min() -> u32 {
        5
    }

    fn default_max() -> u32 {
        20
    }
}

impl Protocol {
    /// The scheme string of the protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn diff_values(path: &str, a: &Value, b: &Value, changed: &mut Vec<String>) {
    match (a, b) {
        (Value::Mapping(ma), Value::Mapping(mb)) => {
            let mut keys: Vec<&Value> = ma.keys().collect();
            for key in mb.keys() {
                if !ma.contains_key(key) {
                    keys.push(key);
                }
            }

            for key in keys {
                let name = match key {
                    Value::String(s) => s.clone(),
                    other => format!("{:?}", other),
                };
                let child = if path.is_empty() {
                    name
                } else {
                    format!("{}.{}", path, name)
                };

                let va = ma.get(key).unwrap_or(&Value::Null);
                let vb = mb.get(key).unwrap_or(&Value::Null);
                diff_values(&child, va, vb, changed);
            }
        }
        _ => {
            if a != b {
                changed.push(path.to_string());
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for EnvironmentConfig {
    fn default() -> Self {
        EnvironmentConfig::builder().name("").build()
    }
}

impl Default for PlatformGui {
    fn default() -> Self {
        PlatformGui {
            base_url: String::new(),
            port: PlatformGui::default_port(),
        }
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Gateway {
            base_url: Gateway::default_base_url(),
            port: Gateway::default_port(),
            aai: Aai::default(),
            swagger: Swagger::default(),
        }
    }
}

impl Default for Swagger {
    fn default() -> Self {
        Swagger {
            title: Swagger::default_title(),
            description: Swagger::default_description(),
        }
    }
}

impl Default for Backoffice {
    fn default() -> Self {
        Backoffice {
            enabled: true,
            gui: BackofficeGui::default(),
            service: BackofficeService::default(),
        }
    }
}

impl Default for BackofficeGui {
    fn default() -> Self {
        BackofficeGui {
            base_url: BackofficeGui::default_base_url(),
            port: BackofficeGui::default_port(),
        }
    }
}

impl Default for BackofficeService {
    fn default() -> Self {
        BackofficeService { auth: true }
    }
}

impl Default for Converter {
    fn default() -> Self {
        Converter {
            enabled: true,
            auth: true,
        }
    }
}

impl Default for ResourcesService {
    fn default() -> Self {
        ResourcesService {
            auth: true,
            cache_ttl: ResourcesService::default_cache_ttl(),
        }
    }
}

impl Default for IngestorService {
    fn default() -> Self {
        IngestorService {
            auth: true,
            hash: IngestorService::default_hash(),
        }
    }
}

impl Default for ExternalAccessService {
    fn default() -> Self {
        ExternalAccessService { auth: true }
    }
}

impl Default for SharingService {
    fn default() -> Self {
        SharingService {
            enabled: true,
            auth: true,
        }
    }
}

impl Default for EmailSenderService {
    fn default() -> Self {
        EmailSenderService {
            enabled: false,
            environment_type: EnvironmentType::default(),
            mail_type: EmailSenderService::default_mail_type(),
            sender_name: EmailSenderService::default_sender_name(),
            sender_email: EmailSenderService::default_sender_email(),
            mail_api_key: String::new(),
            mail_api_secret: String::new(),
        }
    }
}

impl Default for RabbitMq {
    fn default() -> Self {
        RabbitMq {
            host: RabbitMq::default_host(),
            username: RabbitMq::default_username(),
            password: RabbitMq::default_password(),
            vhost: RabbitMq::default_vhost(),
        }
    }
}

impl Default for MetadataDatabase {
    fn default() -> Self {
        MetadataDatabase {
            user: MetadataDatabase::default_user(),
            password: MetadataDatabase::default_password(),
            host: MetadataDatabase::default_host(),
            port: MetadataDatabase::default_port(),
            db_name: MetadataDatabase::default_db_name(),
            pool: DbPool::default(),
        }
    }
}

impl Default for DbPool {
    fn default() -> Self {
        DbPool {
            init: DbPool::default_init(),
            min: DbPool::default_min(),
            max: DbPool::default_max(),
        }
    }
}

impl Default for K8sSettings {
    fn default() -> Self {
        K8sSettings {
            tls_enabled: false,
            url_prefix_namespace: false,
            image_pull_secret: None,
            populator_job: true,
            initialiser_job: true,
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Display for EnvironmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
