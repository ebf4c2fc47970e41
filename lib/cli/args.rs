use std::path::PathBuf;

use clap::Parser;

use crate::config::DEFAULT_POPULATE_PARALLEL;

use super::styles;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// eposctl CLI - Deploy and manage EPOS platform environments
#[derive(Debug, Parser)]
#[command(name = "eposctl", author, about, version, styles=styles::styles())]
pub struct EposctlArgs {
    /// The substrate to operate on
    #[command(subcommand)]
    pub substrate: SubstrateCommand,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// The substrates environments can be managed on
#[derive(Debug, Parser)]
pub enum SubstrateCommand {
    /// Manage environments on the local Docker engine
    #[command(name = "docker", subcommand)]
    Docker(DockerCommand),

    /// Manage environments on a Kubernetes cluster
    #[command(name = "k8s", subcommand)]
    K8s(K8sCommand),
}

/// Operations on Docker-hosted environments
#[derive(Debug, Parser)]
pub enum DockerCommand {
    /// Deploy a new environment
    #[command(name = "deploy")]
    Deploy {
        /// Name of the environment
        name: String,

        /// Configuration document to deploy; defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Pull newer workload images before starting
        #[arg(long)]
        update_images: bool,
    },

    /// Re-apply an environment, optionally under a changed configuration
    #[command(name = "update")]
    Update {
        /// Name of the environment
        name: String,

        /// Configuration document replacing the deployed one
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Also drop volumes, re-register ontologies and clear the
        /// ingested-file history
        #[arg(short, long)]
        force: bool,

        /// Return to the default configuration
        #[arg(long)]
        reset: bool,

        /// Pull newer workload images before re-applying
        #[arg(long)]
        update_images: bool,
    },

    /// Wipe an environment's stateful data while keeping it deployed
    #[command(name = "clean")]
    Clean {
        /// Name of the environment
        name: String,
    },

    /// Delete environments entirely
    #[command(name = "delete")]
    Delete {
        /// Names of the environments to delete
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Ingest TTL metadata files into an environment
    #[command(name = "populate")]
    Populate {
        /// Name of the environment
        name: String,

        /// TTL files or directories to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Maximum concurrent uploads
        #[arg(long, default_value_t = DEFAULT_POPULATE_PARALLEL)]
        parallel: usize,
    },

    /// Render deployment artifacts to disk without deploying
    #[command(name = "render")]
    Render {
        /// Name of the environment
        name: String,

        /// Configuration document to render; defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory the artifacts are written into
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write the default configuration document for editing
    #[command(name = "export")]
    Export {
        /// Directory the document is written into
        path: PathBuf,
    },

    /// List environments
    #[command(name = "list")]
    List,

    /// Show an environment's applied configuration
    #[command(name = "get")]
    Get {
        /// Name of the environment
        name: String,
    },
}

/// Operations on Kubernetes-hosted environments
#[derive(Debug, Parser)]
pub enum K8sCommand {
    /// Deploy a new environment
    #[command(name = "deploy")]
    Deploy {
        /// Name of the environment
        name: String,

        /// Kube-context the cluster is reached through
        #[arg(long)]
        context: String,

        /// Configuration document to deploy; defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Re-apply an environment, optionally under a changed configuration
    #[command(name = "update")]
    Update {
        /// Name of the environment
        name: String,

        /// Kube-context the cluster is reached through
        #[arg(long)]
        context: String,

        /// Configuration document replacing the deployed one
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Also re-register ontologies
        #[arg(short, long)]
        force: bool,

        /// Return to the default configuration
        #[arg(long)]
        reset: bool,
    },

    /// Delete environments entirely
    #[command(name = "delete")]
    Delete {
        /// Names of the environments to delete
        #[arg(required = true)]
        names: Vec<String>,

        /// Kube-context the cluster is reached through
        #[arg(long)]
        context: String,
    },

    /// Ingest TTL metadata files into an environment
    #[command(name = "populate")]
    Populate {
        /// Name of the environment
        name: String,

        /// TTL files or directories to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Kube-context the cluster is reached through
        #[arg(long)]
        context: String,

        /// Maximum concurrent uploads
        #[arg(long, default_value_t = DEFAULT_POPULATE_PARALLEL)]
        parallel: usize,
    },

    /// Render deployment artifacts to disk without deploying
    #[command(name = "render")]
    Render {
        /// Name of the environment
        name: String,

        /// Configuration document to render; defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory the artifacts are written into
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write the default configuration document for editing
    #[command(name = "export")]
    Export {
        /// Directory the document is written into
        path: PathBuf,
    },

    /// List environments
    #[command(name = "list")]
    List {
        /// Kube-context the cluster is reached through
        #[arg(long)]
        context: String,
    },

    /// Show an environment's applied configuration
    #[command(name = "get")]
    Get {
        /// Name of the environment
        name: String,

        /// Kube-context the cluster is reached through
        #[arg(long)]
        context: String,
    },
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_command_definition_is_consistent() {
        EposctlArgs::command().debug_assert();
    }

    #[test]
    fn test_populate_defaults_its_parallelism() {
        let args = EposctlArgs::parse_from([
            "eposctl", "docker", "populate", "prod", "./metadata",
        ]);

        let SubstrateCommand::Docker(DockerCommand::Populate { parallel, paths, name }) =
            args.substrate
        else {
            panic!("expected a docker populate command");
        };
        assert_eq!(name, "prod");
        assert_eq!(parallel, DEFAULT_POPULATE_PARALLEL);
        assert_eq!(paths, vec![PathBuf::from("./metadata")]);
    }

    #[test]
    fn test_k8s_surface_has_no_clean() {
        let result = EposctlArgs::try_parse_from(["eposctl", "k8s", "clean", "prod"]);
        assert!(result.is_err());
    }
}
