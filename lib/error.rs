use std::{
    error::Error,
    fmt::{self, Display},
    path::PathBuf,
};
use thiserror::Error;

use crate::oci::RegistryResponseError;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of an eposctl-related operation.
pub type EposctlResult<T> = Result<T, EposctlError>;

/// An error that occurred while managing EPOS environments.
#[derive(Debug, Error)]
pub enum EposctlError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),

    /// The environment configuration document was rejected. One entry per
    /// offending field, each formatted as `<field>: <reason>`.
    #[error("invalid configuration:\n{}", format_validation_errors(.0))]
    ConfigValidation(Vec<String>),

    /// A command-line input was rejected before any substrate was touched.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An environment with the given name already exists on the target substrate.
    #[error("environment `{0}` already exists")]
    EnvironmentExists(String),

    /// No environment with the given name exists on the target substrate.
    #[error("environment `{0}` does not exist")]
    EnvironmentNotFound(String),

    /// The requested kube-context is not known to kubectl.
    #[error("kube-context `{0}` is not known to kubectl")]
    UnknownContext(String),

    /// An external command exited with a non-zero status.
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        /// The full command line that was invoked.
        command: String,
        /// The exit status, or the signal description when the process was killed.
        status: String,
        /// The tail of the captured stderr output.
        stderr: String,
    },

    /// An ontology document was not accepted by the gateway within the retry budget.
    #[error("ontology document `{name}` was not accepted after {attempts} attempts: {detail}")]
    OntologyRegistration {
        /// Logical name of the ontology document.
        name: String,
        /// Number of attempts made.
        attempts: u32,
        /// Final status or transport error.
        detail: String,
    },

    /// At least one file failed to ingest. The successfully ingested paths are
    /// carried so callers can still report and persist them.
    #[error("{failed} of {total} files failed to ingest")]
    PartialIngest {
        /// Number of files that failed.
        failed: usize,
        /// Total number of files submitted.
        total: usize,
        /// Paths whose ingestion returned 200.
        succeeded: Vec<PathBuf>,
    },

    /// The ingress of a Kubernetes environment never received an address.
    #[error("ingress for environment `{0}` did not receive an address in time")]
    IngressNotReady(String),

    /// The kubectl port-forward process never reported readiness.
    #[error("port-forward did not become ready: {0}")]
    PortForwardFailed(String),

    /// A `${VAR}` reference in a template had no entry in the expansion map.
    #[error("undefined variable `{0}` in compose expansion")]
    UndefinedVariable(String),

    /// The requested operation is not provided by the target substrate.
    #[error("operation `{operation}` is not supported on the {substrate} substrate")]
    UnsupportedCapability {
        /// The operation that was requested.
        operation: String,
        /// The substrate it was requested on.
        substrate: String,
    },

    /// The operation exceeded its overall deadline.
    #[error("operation timed out after {0} seconds")]
    OperationTimeout(u64),

    /// An error that occurred while rendering a template.
    #[error("template rendering error: {0}")]
    Template(#[from] tera::Error),

    /// An error that occurred while parsing a container image reference.
    #[error("invalid image reference: {0}")]
    ImageReference(#[from] oci_spec::distribution::ParseError),

    /// An error response returned by an image registry.
    #[error(transparent)]
    Registry(#[from] RegistryResponseError),

    /// An error that occurred during an HTTP request.
    #[error("http request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// An error that occurred during an HTTP middleware operation.
    #[error("http middleware error: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// An error that occurred while serializing or deserializing YAML.
    #[error("yaml error: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),

    /// An error that occurred while serializing or deserializing JSON.
    #[error("json error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// An error that occurred during a registry database operation.
    #[error("registry database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An error that occurred while applying registry database migrations.
    #[error("registry migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An error that occurred while walking a directory tree.
    #[error("directory walk error: {0}")]
    Walkdir(#[from] walkdir::Error),

    /// An error that occurred when a join handle returned an error.
    #[error("join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl EposctlError {
    /// Creates an `EposctlError` from any error type.
    pub fn custom(error: impl Into<anyhow::Error>) -> EposctlError {
        EposctlError::Custom(AnyError {
            error: error.into(),
        })
    }

    /// Whether this error represents a distinguishable not-found condition,
    /// letting callers branch on absence without string matching.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EposctlError::EnvironmentNotFound(_))
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` `EposctlResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> EposctlResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn format_validation_errors(errors: &[String]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}
