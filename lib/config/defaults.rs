use std::{collections::BTreeMap, time::Duration};

use oci_spec::distribution::Reference;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A remote ontology document registered against a freshly deployed gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OntologyDoc {
    /// Logical name the gateway stores the document under.
    pub name: &'static str,
    /// Whether the document is a base model or a mapping.
    pub kind: OntologyKind,
    /// Location the gateway fetches the document from.
    pub url: &'static str,
}

/// The role of an ontology document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OntologyKind {
    /// A base model document.
    Base,
    /// A mapping document.
    Mapping,
}

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The default host used to build user-facing URLs.
pub const DEFAULT_DOMAIN: &str = "localhost";

/// The default published port of the platform GUI.
pub const DEFAULT_GUI_PORT: u16 = 32000;

/// The default published port of the API gateway.
pub const DEFAULT_GATEWAY_PORT: u16 = 33000;

/// The default published port of the backoffice UI.
pub const DEFAULT_BACKOFFICE_PORT: u16 = 34000;

/// The port the gateway container listens on inside the stack.
pub const GATEWAY_CONTAINER_PORT: u16 = 5000;

/// The shared static security code expected by the gateway's management endpoints.
pub const SECURITY_CODE: &str = "changeme";

/// Metadata model name sent with every populate request.
pub const POPULATE_MODEL: &str = "EPOS-DCAT-AP-V1";

/// Mapping name sent with every populate request.
pub const POPULATE_MAPPING: &str = "EDM-TO-DCAT-AP";

/// Label key marking Helm releases owned by eposctl.
pub const MANAGED_BY_LABEL: &str = "managed-by";

/// Label value marking Helm releases owned by eposctl.
pub const MANAGED_BY_VALUE: &str = "epos";

/// The ordered ontology documents seeded into every new environment:
/// two base models followed by the mapping between them.
pub const ONTOLOGY_DOCS: [OntologyDoc; 3] = [
    OntologyDoc {
        name: "EPOS-DCAT-AP-V1",
        kind: OntologyKind::Base,
        url: "https://raw.githubusercontent.com/epos-eu/EPOS-DCAT-AP/master/epos-dcat-ap_shapes.ttl",
    },
    OntologyDoc {
        name: "EDM-Schema",
        kind: OntologyKind::Base,
        url: "https://raw.githubusercontent.com/epos-eu/EPOS_Data_Model/master/edm-schema.ttl",
    },
    OntologyDoc {
        name: "EDM-TO-DCAT-AP",
        kind: OntologyKind::Mapping,
        url: "https://raw.githubusercontent.com/epos-eu/EPOS-DCAT-AP/master/edm-to-dcat-ap.ttl",
    },
];

/// How many times a single ontology registration is attempted.
pub const ONTOLOGY_MAX_ATTEMPTS: u32 = 3;

/// Pause between ontology registration attempts while the gateway warms up.
pub const ONTOLOGY_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Timeout handed to Helm for install/upgrade/uninstall, matching the
/// deployment rollout deadline.
pub const HELM_TIMEOUT: Duration = Duration::from_secs(300);

/// How long to poll a Kubernetes ingress for its assigned address.
pub const INGRESS_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause between ingress address polls.
pub const INGRESS_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How long to wait for `kubectl port-forward` to report readiness.
pub const PORT_FORWARD_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall deadline applied to every lifecycle operation.
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(600);

/// Deadline for a single image update check.
pub const IMAGE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Concurrency bound for image update checks, one slot per stack image.
pub const IMAGE_CHECK_CONCURRENCY: usize = 13;

/// Concurrency bound for multi-name delete.
pub const DELETE_CONCURRENCY: usize = 20;

/// Smallest accepted `--parallel` value for populate.
pub const MIN_POPULATE_PARALLEL: usize = 1;

/// Largest accepted `--parallel` value for populate.
pub const MAX_POPULATE_PARALLEL: usize = 20;

/// `--parallel` value used when populate is not given one.
pub const DEFAULT_POPULATE_PARALLEL: usize = 5;

/// Image references used when a configuration does not pin its own,
/// keyed by workload id.
pub const DEFAULT_IMAGE_REFS: [(&str, &str); 13] = [
    ("platform_gui", "epos/data-portal:1.8.2"),
    ("gateway", "epos/gateway:1.3.0"),
    ("backoffice_gui", "epos/backoffice-ui:1.1.0"),
    ("backoffice_service", "epos/backoffice-service:1.1.2"),
    ("converter_service", "epos/converter-service:1.2.0"),
    ("converter_routine", "epos/converter-routine:1.2.0"),
    ("resources_service", "epos/resources-service:1.4.1"),
    ("ingestor_service", "epos/ingestor-service:1.4.0"),
    ("external_access_service", "epos/external-access-service:1.3.2"),
    ("sharing_service", "epos/sharing-service:1.0.3"),
    ("email_sender_service", "epos/email-sender-service:1.0.1"),
    ("rabbitmq", "rabbitmq:3.12-management"),
    ("metadata_database", "epos/metadata-database:2.0.0"),
];

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl OntologyKind {
    /// The wire value sent in the `type` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            OntologyKind::Base => "BASE",
            OntologyKind::Mapping => "MAPPING",
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Builds the default image mapping for a fresh configuration.
pub fn default_images() -> BTreeMap<String, Reference> {
    DEFAULT_IMAGE_REFS
        .iter()
        .map(|(workload, image)| {
            let reference = image
                .parse::<Reference>()
                .expect("default image references are well-formed");
            ((*workload).to_string(), reference)
        })
        .collect()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_images_cover_every_workload() {
        let images = default_images();
        assert_eq!(images.len(), DEFAULT_IMAGE_REFS.len());
        assert_eq!(images.len(), IMAGE_CHECK_CONCURRENCY);
    }

    #[test]
    fn test_ontology_docs_are_two_base_one_mapping() {
        let bases = ONTOLOGY_DOCS
            .iter()
            .filter(|d| d.kind == OntologyKind::Base)
            .count();
        let mappings = ONTOLOGY_DOCS
            .iter()
            .filter(|d| d.kind == OntologyKind::Mapping)
            .count();

        assert_eq!(bases, 2);
        assert_eq!(mappings, 1);
        assert_eq!(ONTOLOGY_DOCS[0].name, POPULATE_MODEL);
        assert_eq!(ONTOLOGY_DOCS[2].name, POPULATE_MAPPING);
    }
}
