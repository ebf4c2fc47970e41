use std::{
    env,
    path::PathBuf,
    sync::LazyLock,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Environment variable that overrides the eposctl home directory.
pub const EPOSCTL_HOME_ENV_VAR: &str = "EPOSCTL_HOME";

/// The sub directory under `$HOME` where eposctl state is stored.
pub const EPOSCTL_SUBDIR: &str = ".eposctl";

/// The sub directory of the eposctl home holding one directory per Docker environment.
pub const ENVIRONMENTS_SUBDIR: &str = "environments";

/// Filename of the SQLite registry database inside the eposctl home.
pub const REGISTRY_DB_FILENAME: &str = "eposctl.db";

/// Filename of the authoritative configuration document inside an environment directory.
pub const CONFIG_FILENAME: &str = "config.yaml";

/// Filename of the derived KEY=VALUE file consumed by Docker Compose.
pub const ENV_FILENAME: &str = ".env";

/// Filename of the derived compose document inside an environment directory.
pub const COMPOSE_FILENAME: &str = "docker-compose.yaml";

/// Filename of the Helm values document inside a Kubernetes bundle.
pub const VALUES_FILENAME: &str = "values.yaml";

/// Sub directory of a Kubernetes bundle holding the extracted Helm chart.
pub const CHART_SUBDIR: &str = "chart";

/// Filename of the rendered manifest set produced by the Kubernetes `render` command.
pub const MANIFEST_FILENAME: &str = "manifest.yaml";

/// Target filename of the Docker `export` command.
pub const DOCKER_EXPORT_FILENAME: &str = "docker-config.yaml";

/// Target filename of the Kubernetes `export` command.
pub const K8S_EXPORT_FILENAME: &str = "k8s-config.yaml";

/// The default path where eposctl state is stored when `EPOSCTL_HOME` is unset.
pub static DEFAULT_EPOSCTL_HOME: LazyLock<PathBuf> = LazyLock::new(|| {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(EPOSCTL_SUBDIR)
});

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the eposctl home directory, honouring the `EPOSCTL_HOME` override.
pub fn eposctl_home() -> PathBuf {
    env::var_os(EPOSCTL_HOME_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| DEFAULT_EPOSCTL_HOME.clone())
}

/// Returns the directory holding all Docker environment directories.
pub fn environments_root() -> PathBuf {
    eposctl_home().join(ENVIRONMENTS_SUBDIR)
}

/// Returns the directory owned by the named Docker environment.
pub fn environment_dir(name: &str) -> PathBuf {
    environments_root().join(name)
}

/// Returns the path of the SQLite registry database.
pub fn registry_db_path() -> PathBuf {
    eposctl_home().join(REGISTRY_DB_FILENAME)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_home_override_changes_derived_paths() {
        env::set_var(EPOSCTL_HOME_ENV_VAR, "/tmp/eposctl-test-home");

        assert_eq!(
            eposctl_home(),
            PathBuf::from("/tmp/eposctl-test-home")
        );
        assert_eq!(
            environment_dir("e1"),
            PathBuf::from("/tmp/eposctl-test-home/environments/e1")
        );
        assert_eq!(
            registry_db_path(),
            PathBuf::from("/tmp/eposctl-test-home/eposctl.db")
        );

        env::remove_var(EPOSCTL_HOME_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_default_home_is_under_home_dir() {
        env::remove_var(EPOSCTL_HOME_ENV_VAR);

        let home = eposctl_home();
        assert!(home.ends_with(EPOSCTL_SUBDIR));
    }
}
