//! Engine tests driving the lifecycle operations end to end, against an
//! in-process stub of the platform gateway and a scripted substrate.
//!
//! The scripted substrate records every capability call so the tests can
//! assert the order an operation touches the runtime in, including the
//! teardown and rollback paths that never run against a healthy stack.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    routing::post,
    Router,
};
use eposctl::{
    config::{EnvUrls, EnvironmentConfig, ONTOLOGY_DOCS, ONTOLOGY_MAX_ATTEMPTS, SECURITY_CODE},
    management,
    render::DeploymentBundle,
    substrate::{Environment, Substrate, SubstrateKind},
    utils::DOCKER_EXPORT_FILENAME,
    EposctlError, EposctlResult,
};
use tempfile::tempdir;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Bodies containing this marker are rejected by the stub's ingest route.
const POISON_MARKER: &str = "poison";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Behaviour of the stub gateway's ontology endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OntologyMode {
    Accept,
    FailFirstAttempt,
    FailAlways,
}

/// Shared state of the in-process gateway stub.
struct StubGateway {
    ontology_mode: OntologyMode,
    ontology_requests: AtomicUsize,
    populate_requests: AtomicUsize,
    ontology_attempts: Mutex<HashMap<String, u32>>,
}

/// A substrate whose capabilities are scripted rather than backed by a
/// runtime. Calls are logged in order; `fail_up` makes the bring-up step
/// fail so the failure paths can be observed.
struct ScriptedSubstrate {
    api_url: String,
    fail_up: bool,
    calls: Mutex<Vec<String>>,
    recorded: Mutex<Option<Environment>>,
    ingested: Mutex<Vec<PathBuf>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl StubGateway {
    fn new(ontology_mode: OntologyMode) -> Arc<Self> {
        Arc::new(Self {
            ontology_mode,
            ontology_requests: AtomicUsize::new(0),
            populate_requests: AtomicUsize::new(0),
            ontology_attempts: Mutex::new(HashMap::new()),
        })
    }

    /// Serves the stub on an ephemeral loopback port and returns its base
    /// URL.
    async fn serve(self: &Arc<Self>) -> anyhow::Result<String> {
        let app = Router::new()
            .route("/populate", post(populate_route))
            .route("/ontology", post(ontology_route))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}", listener.local_addr()?);

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("stub gateway failed");
        });

        Ok(url)
    }

    fn ontology_requests(&self) -> usize {
        self.ontology_requests.load(Ordering::SeqCst)
    }

    fn populate_requests(&self) -> usize {
        self.populate_requests.load(Ordering::SeqCst)
    }
}

impl ScriptedSubstrate {
    fn new(api_url: &str) -> Self {
        Self {
            api_url: api_url.to_string(),
            fail_up: false,
            calls: Mutex::new(Vec::new()),
            recorded: Mutex::new(None),
            ingested: Mutex::new(Vec::new()),
        }
    }

    fn failing_up(api_url: &str) -> Self {
        Self {
            fail_up: true,
            ..Self::new(api_url)
        }
    }

    fn log(&self, call: &str) {
        self.calls
            .lock()
            .expect("call log poisoned")
            .push(call.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("call log poisoned").clone()
    }

    fn reset_calls(&self) {
        self.calls.lock().expect("call log poisoned").clear();
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl Substrate for ScriptedSubstrate {
    fn kind(&self) -> SubstrateKind {
        SubstrateKind::Docker
    }

    async fn preflight(&self, _config: &mut EnvironmentConfig) -> EposctlResult<()> {
        self.log("preflight");
        Ok(())
    }

    async fn pull_images(&self, _config: &EnvironmentConfig) -> EposctlResult<()> {
        self.log("pull_images");
        Ok(())
    }

    async fn render_bundle(&self, _config: &EnvironmentConfig) -> EposctlResult<DeploymentBundle> {
        self.log("render_bundle");
        DeploymentBundle::new()
    }

    async fn up(
        &self,
        _config: &EnvironmentConfig,
        _bundle: &DeploymentBundle,
        _fresh: bool,
    ) -> EposctlResult<()> {
        self.log("up");
        if self.fail_up {
            return Err(EposctlError::custom(anyhow::anyhow!(
                "the stack refused to start"
            )));
        }
        Ok(())
    }

    async fn wait_ready(&self, _config: &EnvironmentConfig) -> EposctlResult<()> {
        self.log("wait_ready");
        Ok(())
    }

    async fn down(&self, _name: &str, volumes: bool) -> EposctlResult<()> {
        self.log(if volumes { "down+volumes" } else { "down" });
        Ok(())
    }

    async fn build_urls(&self, _config: &EnvironmentConfig) -> EposctlResult<EnvUrls> {
        self.log("build_urls");
        Ok(EnvUrls::builder()
            .gui("http://127.0.0.1:32000".to_string())
            .api(self.api_url.clone())
            .build())
    }

    fn assemble(&self, config: EnvironmentConfig, urls: EnvUrls) -> Environment {
        Environment::builder()
            .name(config.get_name().clone())
            .kind(SubstrateKind::Docker)
            .config(config)
            .urls(urls)
            .build()
    }

    async fn resume(&self, _name: &str) -> EposctlResult<()> {
        self.log("resume");
        Ok(())
    }

    async fn record(&self, environment: &Environment) -> EposctlResult<()> {
        self.log("record");
        *self.recorded.lock().expect("record slot poisoned") = Some(environment.clone());
        Ok(())
    }

    async fn erase_record(&self, _name: &str) -> EposctlResult<()> {
        self.log("erase_record");
        *self.recorded.lock().expect("record slot poisoned") = None;
        Ok(())
    }

    async fn list(&self) -> EposctlResult<Vec<Environment>> {
        let recorded = self.recorded.lock().expect("record slot poisoned").clone();
        Ok(recorded.into_iter().collect())
    }

    async fn get(&self, name: &str) -> EposctlResult<Environment> {
        self.log("get");
        match self.recorded.lock().expect("record slot poisoned").clone() {
            Some(environment) if environment.get_name() == name => Ok(environment),
            _ => Err(EposctlError::EnvironmentNotFound(name.to_string())),
        }
    }

    async fn delete(&self, name: &str) -> EposctlResult<()> {
        self.log("delete");
        let mut recorded = self.recorded.lock().expect("record slot poisoned");
        match recorded.as_ref() {
            Some(environment) if environment.get_name() == name => {
                *recorded = None;
                self.ingested.lock().expect("ingest log poisoned").clear();
                Ok(())
            }
            _ => Err(EposctlError::EnvironmentNotFound(name.to_string())),
        }
    }

    async fn clean_state(&self, _environment: &Environment) -> EposctlResult<()> {
        self.log("clean_state");
        Ok(())
    }

    async fn record_ingested(&self, _name: &str, path: &Path) -> EposctlResult<()> {
        self.ingested
            .lock()
            .expect("ingest log poisoned")
            .push(path.to_path_buf());
        Ok(())
    }

    async fn ingested_files(&self, _name: &str) -> EposctlResult<Vec<PathBuf>> {
        Ok(self.ingested.lock().expect("ingest log poisoned").clone())
    }

    async fn clear_ingested(&self, _name: &str) -> EposctlResult<()> {
        self.log("clear_ingested");
        self.ingested.lock().expect("ingest log poisoned").clear();
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Routes
//--------------------------------------------------------------------------------------------------

async fn populate_route(
    State(gateway): State<Arc<StubGateway>>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> StatusCode {
    gateway.populate_requests.fetch_add(1, Ordering::SeqCst);

    if params.get("securityCode").map(String::as_str) != Some(SECURITY_CODE) {
        return StatusCode::UNAUTHORIZED;
    }
    if params.get("type").map(String::as_str) != Some("single") {
        return StatusCode::BAD_REQUEST;
    }

    if String::from_utf8_lossy(&body).contains(POISON_MARKER) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    StatusCode::OK
}

async fn ontology_route(
    State(gateway): State<Arc<StubGateway>>,
    Query(params): Query<HashMap<String, String>>,
) -> StatusCode {
    gateway.ontology_requests.fetch_add(1, Ordering::SeqCst);

    let (Some(name), Some(_), Some(_)) = (
        params.get("name"),
        params.get("path"),
        params.get("type"),
    ) else {
        return StatusCode::BAD_REQUEST;
    };
    if params.get("securityCode").map(String::as_str) != Some(SECURITY_CODE) {
        return StatusCode::UNAUTHORIZED;
    }

    match gateway.ontology_mode {
        OntologyMode::Accept => StatusCode::OK,
        OntologyMode::FailAlways => StatusCode::INTERNAL_SERVER_ERROR,
        OntologyMode::FailFirstAttempt => {
            let mut attempts = gateway
                .ontology_attempts
                .lock()
                .expect("attempt map poisoned");
            let seen = attempts.entry(name.clone()).or_insert(0);
            *seen += 1;
            if *seen == 1 {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                StatusCode::OK
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_deploy_brings_the_stack_up_and_records_it() -> anyhow::Result<()> {
    let gateway = StubGateway::new(OntologyMode::Accept);
    let url = gateway.serve().await?;
    let substrate = ScriptedSubstrate::new(&url);

    let environment =
        management::deploy(&substrate, EnvironmentConfig::default_docker("e1"), false).await?;

    assert_eq!(environment.get_name(), "e1");
    assert_eq!(environment.get_urls().get_api(), &url);
    assert_eq!(gateway.ontology_requests(), ONTOLOGY_DOCS.len());
    assert_eq!(
        substrate.calls(),
        vec![
            "get",
            "preflight",
            "render_bundle",
            "up",
            "wait_ready",
            "build_urls",
            "record"
        ]
    );

    let fetched = management::get_environment(&substrate, "e1").await?;
    assert_eq!(fetched, environment);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_deploy_rejects_a_name_that_already_exists() -> anyhow::Result<()> {
    let gateway = StubGateway::new(OntologyMode::Accept);
    let url = gateway.serve().await?;
    let substrate = ScriptedSubstrate::new(&url);

    management::deploy(&substrate, EnvironmentConfig::default_docker("e1"), false).await?;

    let error = management::deploy(&substrate, EnvironmentConfig::default_docker("e1"), false)
        .await
        .expect_err("a second deploy under the same name must fail");
    assert!(matches!(error, EposctlError::EnvironmentExists(name) if name == "e1"));

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_deploy_failure_tears_the_stack_down() -> anyhow::Result<()> {
    let substrate = ScriptedSubstrate::failing_up("http://127.0.0.1:9");

    let error = management::deploy(&substrate, EnvironmentConfig::default_docker("e1"), false)
        .await
        .expect_err("a failing bring-up must fail the deploy");
    assert!(error.to_string().contains("refused to start"));

    assert_eq!(
        substrate.calls(),
        vec!["get", "preflight", "render_bundle", "up", "down+volumes"]
    );
    assert!(substrate.get("e1").await.unwrap_err().is_not_found());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_update_in_place_reapplies_the_deployed_configuration() -> anyhow::Result<()> {
    let gateway = StubGateway::new(OntologyMode::Accept);
    let url = gateway.serve().await?;
    let substrate = ScriptedSubstrate::new(&url);

    management::deploy(&substrate, EnvironmentConfig::default_docker("e1"), false).await?;
    substrate.reset_calls();

    let environment = management::update(&substrate, "e1", None, false, false, false).await?;

    assert_eq!(environment.get_name(), "e1");
    assert_eq!(
        substrate.calls(),
        vec![
            "get",
            "render_bundle",
            "up",
            "wait_ready",
            "build_urls",
            "record"
        ]
    );
    // The non-forced update must not have re-registered any ontologies.
    assert_eq!(gateway.ontology_requests(), ONTOLOGY_DOCS.len());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_update_rejects_reset_combined_with_a_new_configuration() -> anyhow::Result<()> {
    let substrate = ScriptedSubstrate::new("http://127.0.0.1:9");
    let replacement = EnvironmentConfig::default_docker("e1");

    let error = management::update(&substrate, "e1", Some(replacement), false, false, true)
        .await
        .expect_err("conflicting update flags must be rejected");

    assert!(matches!(error, EposctlError::InvalidInput(_)));
    assert!(substrate.calls().is_empty());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_forced_update_reseeds_ontologies_and_ingest_history() -> anyhow::Result<()> {
    let gateway = StubGateway::new(OntologyMode::Accept);
    let url = gateway.serve().await?;
    let substrate = ScriptedSubstrate::new(&url);

    management::deploy(&substrate, EnvironmentConfig::default_docker("e1"), false).await?;
    substrate
        .record_ingested("e1", Path::new("/data/seed.ttl"))
        .await?;
    substrate.reset_calls();

    management::update(&substrate, "e1", None, false, true, false).await?;

    assert_eq!(
        substrate.calls(),
        vec![
            "get",
            "render_bundle",
            "up",
            "wait_ready",
            "build_urls",
            "clear_ingested",
            "record"
        ]
    );
    assert_eq!(gateway.ontology_requests(), 2 * ONTOLOGY_DOCS.len());
    assert!(substrate.ingested_files("e1").await?.is_empty());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_clean_wipes_state_and_reseeds_the_ontologies() -> anyhow::Result<()> {
    let gateway = StubGateway::new(OntologyMode::Accept);
    let url = gateway.serve().await?;
    let substrate = ScriptedSubstrate::new(&url);
    management::deploy(&substrate, EnvironmentConfig::default_docker("e1"), false).await?;
    substrate
        .record_ingested("e1", Path::new("/data/seed.ttl"))
        .await?;
    substrate.reset_calls();

    management::clean(&substrate, "e1").await?;

    assert_eq!(
        substrate.calls(),
        vec!["get", "clean_state", "clear_ingested"]
    );
    assert_eq!(gateway.ontology_requests(), 2 * ONTOLOGY_DOCS.len());
    assert!(substrate.ingested_files("e1").await?.is_empty());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_delete_removes_the_environment_and_reports_missing_names() -> anyhow::Result<()> {
    let gateway = StubGateway::new(OntologyMode::Accept);
    let url = gateway.serve().await?;
    let substrate = ScriptedSubstrate::new(&url);
    management::deploy(&substrate, EnvironmentConfig::default_docker("e1"), false).await?;

    let names = vec!["e1".to_string(), "ghost".to_string()];
    let error = management::delete_many(&substrate, &names)
        .await
        .expect_err("the missing name must surface");
    assert!(error.is_not_found());

    // The sibling failure must not have stopped the real deletion.
    let fetched = management::get_environment(&substrate, "e1").await;
    assert!(fetched.unwrap_err().is_not_found());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_populate_ingests_files_and_records_them() -> anyhow::Result<()> {
    let gateway = StubGateway::new(OntologyMode::Accept);
    let url = gateway.serve().await?;
    let substrate = ScriptedSubstrate::new(&url);
    management::deploy(&substrate, EnvironmentConfig::default_docker("e1"), false).await?;

    let data = tempdir()?;
    for name in ["a.ttl", "b.ttl", "c.ttl"] {
        std::fs::write(data.path().join(name), "<urn:s> <urn:p> <urn:o> .")?;
    }

    let succeeded =
        management::populate(&substrate, "e1", &[data.path().to_path_buf()], 2).await?;

    assert_eq!(
        succeeded,
        vec![
            data.path().join("a.ttl"),
            data.path().join("b.ttl"),
            data.path().join("c.ttl")
        ]
    );
    assert_eq!(substrate.ingested_files("e1").await?, succeeded);
    assert_eq!(gateway.populate_requests(), 3);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_populate_reports_partial_failures_with_the_survivors() -> anyhow::Result<()> {
    let gateway = StubGateway::new(OntologyMode::Accept);
    let url = gateway.serve().await?;
    let substrate = ScriptedSubstrate::new(&url);
    management::deploy(&substrate, EnvironmentConfig::default_docker("e1"), false).await?;

    let data = tempdir()?;
    std::fs::write(data.path().join("a.ttl"), "<urn:s> <urn:p> <urn:o> .")?;
    std::fs::write(data.path().join("b.ttl"), format!("# {}", POISON_MARKER))?;
    std::fs::write(data.path().join("c.ttl"), "<urn:s> <urn:p> <urn:o> .")?;

    let error = management::populate(&substrate, "e1", &[data.path().to_path_buf()], 2)
        .await
        .expect_err("a rejected file must fail the ingest");

    match error {
        EposctlError::PartialIngest {
            failed,
            total,
            succeeded,
        } => {
            assert_eq!((failed, total), (1, 3));
            assert_eq!(
                succeeded,
                vec![data.path().join("a.ttl"), data.path().join("c.ttl")]
            );
            // Only the files that came back with a 200 may be recorded.
            assert_eq!(substrate.ingested_files("e1").await?, succeeded);
        }
        other => panic!("expected a partial ingest failure, got {other:?}"),
    }

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_ontology_bootstrap_retries_while_the_gateway_warms_up() -> anyhow::Result<()> {
    let gateway = StubGateway::new(OntologyMode::FailFirstAttempt);
    let url = gateway.serve().await?;

    management::bootstrap_ontologies(&url).await?;

    assert_eq!(gateway.ontology_requests(), 2 * ONTOLOGY_DOCS.len());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_ontology_bootstrap_exhausts_its_retry_budget() -> anyhow::Result<()> {
    let gateway = StubGateway::new(OntologyMode::FailAlways);
    let url = gateway.serve().await?;

    let error = management::bootstrap_ontologies(&url)
        .await
        .expect_err("a persistently failing gateway must fail the bootstrap");

    match error {
        EposctlError::OntologyRegistration { name, attempts, .. } => {
            // Registration is sequential and stops at the first document
            // whose retry budget is exhausted.
            assert_eq!(name, ONTOLOGY_DOCS[0].name);
            assert_eq!(attempts, ONTOLOGY_MAX_ATTEMPTS);
        }
        other => panic!("expected an ontology registration failure, got {other:?}"),
    }
    assert_eq!(gateway.ontology_requests(), ONTOLOGY_MAX_ATTEMPTS as usize);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_exported_document_round_trips() -> anyhow::Result<()> {
    let directory = tempdir()?;
    let exported = directory.path().join(DOCKER_EXPORT_FILENAME);

    let original = EnvironmentConfig::default_docker("sample");
    original.save(&exported).await?;

    let loaded = EnvironmentConfig::from_file(&exported).await?;
    assert_eq!(loaded, original);
    loaded.validate()?;

    loaded.save(&exported).await?;
    assert_eq!(EnvironmentConfig::from_file(&exported).await?, loaded);

    Ok(())
}
