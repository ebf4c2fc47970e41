//! Anonymous client for the registry distribution API.
//!
//! The update check compares the digest a registry currently serves for a
//! workload tag against the digest recorded locally by `docker pull`, and
//! fetches the remote image's creation time when they differ. Reads are
//! anonymous: Docker Hub hands out short-lived pull tokens to anyone, and
//! the check degrades to advisory output when a registry refuses us.

use chrono::{DateTime, Utc};
use oci_spec::{
    distribution::Reference,
    image::{Descriptor, ImageConfiguration, ImageIndex, ImageManifest, Os},
};
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{error::EposctlError, EposctlResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The registry domain that Docker Hub references normalize to.
const DOCKER_REGISTRY_DOMAIN: &str = "docker.io";

/// The Docker Hub distribution endpoint.
const DOCKER_REGISTRY_URL: &str = "https://registry-1.docker.io";

/// The service name expected by the Docker Hub token endpoint.
const DOCKER_AUTH_SERVICE: &str = "registry.docker.io";

/// The Docker Hub token endpoint.
const DOCKER_AUTH_REALM: &str = "https://auth.docker.io/token";

/// MIME type for Docker image manifests.
const DOCKER_MANIFEST_MIME_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// MIME type for Docker manifest lists.
const DOCKER_MANIFEST_LIST_MIME_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// MIME type for OCI image manifests.
const OCI_MANIFEST_MIME_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// MIME type for OCI image indexes.
const OCI_INDEX_MIME_TYPE: &str = "application/vnd.oci.image.index.v1+json";

/// MIME type for image config blobs.
const DOCKER_CONFIG_MIME_TYPE: &str = "application/vnd.docker.container.image.v1+json";

/// Annotation present on attestation entries inside an image index.
const DOCKER_REFERENCE_TYPE_ANNOTATION: &str = "vnd.docker.reference.type";

/// Response header carrying the canonical digest of the served manifest.
const CONTENT_DIGEST_HEADER: &str = "docker-content-digest";

/// Tag assumed when a reference carries neither a tag nor a digest.
const DEFAULT_TAG: &str = "latest";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A client for reading manifests and image configs from registries that speak
/// the Docker Registry HTTP API v2 / OCI distribution API.
///
/// Docker Hub requires a bearer token even for anonymous reads, so requests
/// against `docker.io` references fetch a short-lived pull token first. Other
/// registries are queried without credentials.
#[derive(Debug)]
pub struct RegistryClient {
    /// The HTTP client used to make requests to registries.
    client: ClientWithMiddleware,
}

/// Token material returned by the Docker Hub token service.
#[derive(Debug, Deserialize)]
struct RegistryAuthMaterial {
    /// The bearer token to attach to subsequent registry requests.
    token: String,
}

/// A distribution-API response, which is either the requested document (`Ok`)
/// or an error body (`Error`).
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegistryResponse<T> {
    /// The requested document.
    Ok(T),

    /// The error body returned by the registry.
    Error(RegistryResponseError),
}

/// An error body returned by a registry, including detailed error messages.
#[derive(Debug, Serialize, Deserialize, Error)]
#[error("registry error: {errors}")]
pub struct RegistryResponseError {
    /// The errors returned by the registry.
    errors: serde_json::Value,
}

/// The document a registry serves for a tag, which may be a multi-platform
/// index or a single manifest depending on how the image was published.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestDocument {
    /// A multi-platform image index.
    Index(ImageIndex),

    /// A single-platform image manifest.
    Manifest(ImageManifest),

    /// The error body returned by the registry.
    Error(RegistryResponseError),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RegistryClient {
    /// Creates a registry client that retries transient failures with
    /// exponential backoff.
    pub fn new() -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client_builder = ClientBuilder::new(Client::new());
        let client = client_builder
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self { client }
    }

    /// Queries the digest the registry currently serves for the reference.
    ///
    /// This is the digest `docker pull` records in `RepoDigests`, so comparing
    /// it against the locally recorded one tells whether the tag has moved.
    pub async fn head_digest(&self, image: &Reference) -> EposctlResult<String> {
        let request = self
            .authorize(self.client.head(manifest_url(image)), image)
            .await?
            .header("Accept", manifest_accept())
            .build()?;

        let response = self.client.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EposctlError::custom(anyhow::anyhow!(
                "registry returned {status} for `{image}`"
            )));
        }

        response
            .headers()
            .get(CONTENT_DIGEST_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| {
                EposctlError::custom(anyhow::anyhow!(
                    "registry sent no content digest for `{image}`"
                ))
            })
    }

    /// Queries the creation timestamp of the image the reference points at.
    ///
    /// Returns `None` when the registry serves an index with no runnable
    /// manifest, or when the image config carries no creation time.
    pub async fn image_created(&self, image: &Reference) -> EposctlResult<Option<DateTime<Utc>>> {
        let Some(manifest) = self.fetch_manifest(image).await? else {
            return Ok(None);
        };

        let config = self
            .fetch_config(image, &manifest.config().digest().to_string())
            .await?;

        let Some(created) = config.created() else {
            return Ok(None);
        };

        let created = DateTime::parse_from_rfc3339(created).map_err(EposctlError::custom)?;
        Ok(Some(created.with_timezone(&Utc)))
    }

    /// Resolves the reference to a single image manifest, descending through a
    /// multi-platform index when the registry serves one.
    async fn fetch_manifest(&self, image: &Reference) -> EposctlResult<Option<ImageManifest>> {
        let request = self
            .authorize(self.client.get(manifest_url(image)), image)
            .await?
            .header("Accept", manifest_accept())
            .build()?;

        let response = self.client.execute(request).await?;
        let document = response.json::<ManifestDocument>().await?;

        match document {
            ManifestDocument::Manifest(manifest) => Ok(Some(manifest)),
            ManifestDocument::Index(index) => match select_platform_manifest(&index) {
                Some(descriptor) => {
                    let manifest = self
                        .fetch_manifest_by_digest(image, &descriptor.digest().to_string())
                        .await?;
                    Ok(Some(manifest))
                }
                None => Ok(None),
            },
            ManifestDocument::Error(err) => Err(err.into()),
        }
    }

    /// Fetches the image manifest stored under the given digest.
    async fn fetch_manifest_by_digest(
        &self,
        image: &Reference,
        digest: &str,
    ) -> EposctlResult<ImageManifest> {
        let url = format!(
            "{}/v2/{}/manifests/{}",
            registry_base(image),
            image.repository(),
            digest
        );
        let request = self
            .authorize(self.client.get(url), image)
            .await?
            .header(
                "Accept",
                format!("{DOCKER_MANIFEST_MIME_TYPE}, {OCI_MANIFEST_MIME_TYPE}"),
            )
            .build()?;

        let response = self.client.execute(request).await?;
        let manifest = response.json::<RegistryResponse<ImageManifest>>().await?;

        match manifest {
            RegistryResponse::Ok(manifest) => Ok(manifest),
            RegistryResponse::Error(err) => Err(err.into()),
        }
    }

    /// Fetches the image configuration blob referenced by a manifest.
    async fn fetch_config(
        &self,
        image: &Reference,
        digest: &str,
    ) -> EposctlResult<ImageConfiguration> {
        let url = format!(
            "{}/v2/{}/blobs/{}",
            registry_base(image),
            image.repository(),
            digest
        );
        let request = self
            .authorize(self.client.get(url), image)
            .await?
            .header("Accept", DOCKER_CONFIG_MIME_TYPE)
            .build()?;

        let response = self.client.execute(request).await?;
        let config = response
            .json::<RegistryResponse<ImageConfiguration>>()
            .await?;

        match config {
            RegistryResponse::Ok(config) => Ok(config),
            RegistryResponse::Error(err) => Err(err.into()),
        }
    }

    /// Attaches a pull token when the registry demands one for anonymous reads.
    ///
    /// Docker Hub tokens expire after 300 seconds, so we just fetch a fresh one
    /// per request rather than caching.
    async fn authorize(
        &self,
        request: RequestBuilder,
        image: &Reference,
    ) -> EposctlResult<RequestBuilder> {
        if image.registry() != DOCKER_REGISTRY_DOMAIN {
            return Ok(request);
        }

        let token = self.fetch_pull_token(image.repository()).await?;
        Ok(request.bearer_auth(token))
    }

    /// Fetches a short-lived anonymous pull token from the Docker Hub token
    /// service.
    async fn fetch_pull_token(&self, repository: &str) -> EposctlResult<String> {
        let request = self
            .client
            .get(DOCKER_AUTH_REALM)
            .query(&[
                ("service", DOCKER_AUTH_SERVICE),
                ("scope", format!("repository:{}:pull", repository).as_str()),
            ])
            .build()?;

        let response = self.client.execute(request).await?;
        let material = response.json::<RegistryAuthMaterial>().await?;

        Ok(material.token)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// The distribution endpoint serving the reference's registry.
fn registry_base(image: &Reference) -> String {
    if image.registry() == DOCKER_REGISTRY_DOMAIN {
        DOCKER_REGISTRY_URL.to_string()
    } else {
        format!("https://{}", image.registry())
    }
}

/// The manifest URL for the reference, addressing by digest when one is pinned.
fn manifest_url(image: &Reference) -> String {
    let selector = image
        .digest()
        .or_else(|| image.tag())
        .unwrap_or(DEFAULT_TAG);

    format!(
        "{}/v2/{}/manifests/{}",
        registry_base(image),
        image.repository(),
        selector
    )
}

/// Accept header covering every manifest flavor a registry may serve for a tag.
fn manifest_accept() -> String {
    [
        DOCKER_MANIFEST_LIST_MIME_TYPE,
        DOCKER_MANIFEST_MIME_TYPE,
        OCI_INDEX_MIME_TYPE,
        OCI_MANIFEST_MIME_TYPE,
    ]
    .join(", ")
}

/// Picks the runnable manifest out of a multi-platform index, preferring
/// `linux/amd64` and skipping attestation entries.
fn select_platform_manifest(index: &ImageIndex) -> Option<&Descriptor> {
    index
        .manifests()
        .iter()
        .find(|descriptor| {
            descriptor.platform().as_ref().is_some_and(|platform| {
                matches!(platform.os(), Os::Linux)
                    && platform.architecture().to_string() == "amd64"
                    && !is_attestation(descriptor)
            })
        })
        .or_else(|| {
            index.manifests().iter().find(|descriptor| {
                descriptor.platform().as_ref().is_some_and(|platform| {
                    matches!(platform.os(), Os::Linux) && !is_attestation(descriptor)
                })
            })
        })
        .or_else(|| {
            index
                .manifests()
                .iter()
                .find(|descriptor| !is_attestation(descriptor))
        })
}

/// Whether an index entry is an attestation rather than a runnable manifest.
fn is_attestation(descriptor: &Descriptor) -> bool {
    descriptor
        .annotations()
        .as_ref()
        .is_some_and(|annotations| annotations.contains_key(DOCKER_REFERENCE_TYPE_ANNOTATION))
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
