//! Bulk ingestion of TTL metadata files into an environment.

use std::path::{Path, PathBuf};

use futures::future;
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use tokio::sync::Semaphore;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::{
    config::{
        MAX_POPULATE_PARALLEL, MIN_POPULATE_PARALLEL, POPULATE_MAPPING, POPULATE_MODEL,
        SECURITY_CODE,
    },
    error::EposctlError,
    substrate::Substrate,
    EposctlResult,
};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Ingests the TTL files under the given paths into an environment.
///
/// Directories are walked recursively; every `*.ttl` file found is POSTed
/// to the environment's ingest endpoint, at most `parallel` at a time. A
/// failed file does not abort its siblings: the operation errors when at
/// least one file failed, and the returned or carried path list names the
/// files that made it either way.
///
/// Cluster-hosted environments are reached through a port-forward tunnel
/// so uploads bypass the ingress body limits; when the tunnel cannot be
/// opened the ingress URL is used as fallback.
pub async fn populate(
    substrate: &dyn Substrate,
    name: &str,
    paths: &[PathBuf],
    parallel: usize,
) -> EposctlResult<Vec<PathBuf>> {
    if !(MIN_POPULATE_PARALLEL..=MAX_POPULATE_PARALLEL).contains(&parallel) {
        return Err(EposctlError::InvalidInput(format!(
            "--parallel must be between {} and {}",
            MIN_POPULATE_PARALLEL, MAX_POPULATE_PARALLEL
        )));
    }

    let environment = substrate.get(name).await?;

    let files = collect_ttl_files(paths).await?;
    if files.is_empty() {
        info!("No TTL files found under the given paths");
        return Ok(Vec::new());
    }

    info!("Ingesting {} TTL files into `{}`", files.len(), name);

    match substrate.open_ingest_tunnel(&environment).await {
        Ok(Some(forward)) => {
            let base = environment
                .get_config()
                .get_components()
                .get_gateway()
                .get_base_url()
                .clone();
            let endpoint = tunnel_endpoint(forward.get_local_port(), &base);

            let result = ingest_files(substrate, name, &endpoint, &files, parallel).await;
            if let Err(error) = forward.close().await {
                warn!("Closing the ingest tunnel failed: {}", error);
            }
            result
        }
        Ok(None) => {
            let endpoint = environment.get_urls().ingest_endpoint();
            ingest_files(substrate, name, endpoint, &files, parallel).await
        }
        Err(error) => {
            warn!(
                "Could not open an ingest tunnel ({}), falling back to the ingress URL",
                error
            );
            let endpoint = environment.get_urls().ingest_endpoint();
            ingest_files(substrate, name, endpoint, &files, parallel).await
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Gathers the TTL files named by the given paths, sorted and de-duplicated.
async fn collect_ttl_files(paths: &[PathBuf]) -> EposctlResult<Vec<PathBuf>> {
    let paths = paths.to_vec();

    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        for path in paths {
            if path.is_dir() {
                for entry in WalkDir::new(&path) {
                    let entry = entry?;
                    if entry.file_type().is_file() && is_ttl(entry.path()) {
                        files.push(entry.into_path());
                    }
                }
            } else if is_ttl(&path) {
                files.push(path);
            } else {
                warn!("Skipping {}: not a TTL file", path.display());
            }
        }

        files.sort();
        files.dedup();
        Ok(files)
    })
    .await?
}

fn is_ttl(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("ttl"))
}

/// The ingest endpoint reached through a loopback tunnel: the gateway's
/// own base path served directly on the forwarded port.
fn tunnel_endpoint(local_port: u16, base_url: &str) -> String {
    let base = base_url.trim_matches('/');
    if base.is_empty() {
        format!("http://127.0.0.1:{}", local_port)
    } else {
        format!("http://127.0.0.1:{}/{}", local_port, base)
    }
}

/// Submits every file and tallies the outcome. Successful paths are
/// recorded against the environment as they complete.
async fn ingest_files(
    substrate: &dyn Substrate,
    name: &str,
    endpoint: &str,
    files: &[PathBuf],
    parallel: usize,
) -> EposctlResult<Vec<PathBuf>> {
    let client = Client::new();
    let semaphore = Semaphore::new(parallel);

    let mut tasks = Vec::new();
    for file in files {
        let client = &client;
        let semaphore = &semaphore;
        tasks.push(async move {
            let _permit = semaphore.acquire().await.map_err(EposctlError::custom)?;
            submit_file(client, endpoint, file).await
        });
    }

    let results = future::join_all(tasks).await;

    let total = files.len();
    let mut succeeded = Vec::new();
    let mut failed = 0;
    for (file, result) in files.iter().zip(results) {
        match result {
            Ok(()) => {
                substrate.record_ingested(name, file).await?;
                succeeded.push(file.clone());
            }
            Err(error) => {
                warn!("Failed to ingest {}: {}", file.display(), error);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(EposctlError::PartialIngest {
            failed,
            total,
            succeeded,
        });
    }

    info!("Ingested {} files into `{}`", succeeded.len(), name);
    Ok(succeeded)
}

async fn submit_file(client: &Client, endpoint: &str, file: &Path) -> EposctlResult<()> {
    let bytes = tokio::fs::read(file).await?;

    let response = client
        .post(format!("{}/populate", endpoint))
        .query(&[
            ("securityCode", SECURITY_CODE),
            ("type", "single"),
            ("model", POPULATE_MODEL),
            ("mapping", POPULATE_MAPPING),
        ])
        .header(CONTENT_TYPE, "text/turtle")
        .body(bytes)
        .send()
        .await?;

    if response.status() != StatusCode::OK {
        return Err(EposctlError::custom(anyhow::anyhow!(
            "ingest endpoint returned {} for {}",
            response.status(),
            file.display()
        )));
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_collect_walks_directories_and_keeps_explicit_files() -> EposctlResult<()> {
        let root = TempDir::new()?;
        let nested = root.path().join("nested");
        tokio::fs::create_dir_all(&nested).await?;

        tokio::fs::write(root.path().join("a.ttl"), "@prefix : <#> .").await?;
        tokio::fs::write(nested.join("b.TTL"), "@prefix : <#> .").await?;
        tokio::fs::write(nested.join("notes.md"), "not metadata").await?;
        let explicit = root.path().join("c.ttl");
        tokio::fs::write(&explicit, "@prefix : <#> .").await?;

        let files = collect_ttl_files(&[root.path().to_path_buf(), explicit.clone()]).await?;

        assert_eq!(files.len(), 3);
        assert!(files.contains(&root.path().join("a.ttl")));
        assert!(files.contains(&nested.join("b.TTL")));
        assert!(files.contains(&explicit));
        Ok(())
    }

    #[tokio::test]
    async fn test_collect_skips_explicit_non_ttl_files() -> EposctlResult<()> {
        let root = TempDir::new()?;
        let other = root.path().join("data.csv");
        tokio::fs::write(&other, "a,b").await?;

        let files = collect_ttl_files(&[other]).await?;
        assert!(files.is_empty());
        Ok(())
    }

    #[test]
    fn test_tunnel_endpoint_normalizes_the_base_path() {
        assert_eq!(
            tunnel_endpoint(8080, "/api/v1"),
            "http://127.0.0.1:8080/api/v1"
        );
        assert_eq!(
            tunnel_endpoint(8080, "api/v1/"),
            "http://127.0.0.1:8080/api/v1"
        );
        assert_eq!(tunnel_endpoint(8080, ""), "http://127.0.0.1:8080");
    }
}
