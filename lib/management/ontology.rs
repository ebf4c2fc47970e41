//! Ontology bootstrap against a freshly started gateway.

use reqwest::{header::CONNECTION, Client, StatusCode};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    config::{
        OntologyDoc, ONTOLOGY_DOCS, ONTOLOGY_MAX_ATTEMPTS, ONTOLOGY_RETRY_DELAY, SECURITY_CODE,
    },
    error::EposctlError,
    EposctlResult,
};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Registers the base-model and mapping ontologies against an
/// environment's API, in their required order.
///
/// The gateway accepts registrations only once its own backing services
/// answer, which can lag the container start by a few seconds. Documents
/// are therefore retried a bounded number of times; a document that is
/// still refused afterwards fails the enclosing operation.
pub async fn bootstrap_ontologies(api_url: &str) -> EposctlResult<()> {
    info!("Registering {} ontology documents", ONTOLOGY_DOCS.len());

    // The gateway mishandles reused connections while warming up, so
    // every request runs on a fresh one.
    let client = Client::builder().pool_max_idle_per_host(0).build()?;

    for doc in &ONTOLOGY_DOCS {
        register_document(&client, api_url, doc).await?;
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn register_document(client: &Client, api_url: &str, doc: &OntologyDoc) -> EposctlResult<()> {
    let url = format!("{}/ontology", api_url);
    let mut detail = String::new();

    for attempt in 1..=ONTOLOGY_MAX_ATTEMPTS {
        let response = client
            .post(&url)
            .query(&[
                ("path", doc.url),
                ("securityCode", SECURITY_CODE),
                ("name", doc.name),
                ("type", doc.kind.as_str()),
            ])
            .header(CONNECTION, "close")
            .send()
            .await;

        match response {
            Ok(response) if response.status() == StatusCode::OK => {
                info!("Registered ontology `{}`", doc.name);
                return Ok(());
            }
            Ok(response) => {
                detail = format!("status {}", response.status());
            }
            Err(error) => {
                detail = error.to_string();
            }
        }

        if attempt < ONTOLOGY_MAX_ATTEMPTS {
            warn!(
                "Ontology `{}` attempt {}/{} failed ({}), retrying",
                doc.name, attempt, ONTOLOGY_MAX_ATTEMPTS, detail
            );
            sleep(ONTOLOGY_RETRY_DELAY).await;
        }
    }

    Err(EposctlError::OntologyRegistration {
        name: doc.name.to_string(),
        attempts: ONTOLOGY_MAX_ATTEMPTS,
        detail,
    })
}
