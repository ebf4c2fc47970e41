use std::path::{Path, PathBuf};

use eposctl::{
    cli::AnsiStyles,
    config::EnvironmentConfig,
    management::{self, ImageStatus},
    render,
    substrate::{DockerSubstrate, Environment, Helm, K8sSubstrate},
    utils::{
        CHART_SUBDIR, DOCKER_EXPORT_FILENAME, K8S_EXPORT_FILENAME, MANIFEST_FILENAME,
        VALUES_FILENAME,
    },
    EposctlError, EposctlResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const EXPORT_PLACEHOLDER_NAME: &str = "sample";

//--------------------------------------------------------------------------------------------------
// Functions: Docker Handlers
//--------------------------------------------------------------------------------------------------

pub async fn docker_deploy_subcommand(
    name: String,
    config: Option<PathBuf>,
    update_images: bool,
) -> EposctlResult<()> {
    let config = named_config(&name, config.as_deref(), EnvironmentConfig::default_docker).await?;

    let substrate = DockerSubstrate::connect().await?;
    if !update_images {
        advise_image_updates(&config).await;
    }

    let environment =
        management::with_deadline(management::deploy(&substrate, config, update_images)).await?;

    print_environment(&environment);
    Ok(())
}

pub async fn docker_update_subcommand(
    name: String,
    config: Option<PathBuf>,
    force: bool,
    reset: bool,
    update_images: bool,
) -> EposctlResult<()> {
    let new_config = match config {
        Some(path) => Some(EnvironmentConfig::from_file(path).await?),
        None => None,
    };

    let substrate = DockerSubstrate::connect().await?;
    let environment = management::with_deadline(management::update(
        &substrate,
        &name,
        new_config,
        update_images,
        force,
        reset,
    ))
    .await?;

    print_environment(&environment);
    Ok(())
}

pub async fn docker_clean_subcommand(name: String) -> EposctlResult<()> {
    let substrate = DockerSubstrate::connect().await?;
    management::with_deadline(management::clean(&substrate, &name)).await
}

pub async fn docker_delete_subcommand(names: Vec<String>) -> EposctlResult<()> {
    let substrate = DockerSubstrate::connect().await?;
    management::delete_many(&substrate, &names).await
}

pub async fn docker_populate_subcommand(
    name: String,
    paths: Vec<PathBuf>,
    parallel: usize,
) -> EposctlResult<()> {
    let substrate = DockerSubstrate::connect().await?;
    report_ingest(management::populate(&substrate, &name, &paths, parallel).await)
}

pub async fn docker_render_subcommand(
    name: String,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
) -> EposctlResult<()> {
    let config = named_config(&name, config.as_deref(), EnvironmentConfig::default_docker).await?;
    config.validate()?;

    let destination = output.unwrap_or_else(|| PathBuf::from(&name));
    let bundle = render::render_docker(&config).await?;
    bundle.install_into(&destination).await?;

    println!("Rendered Docker artifacts into {}", destination.display());
    Ok(())
}

pub async fn docker_export_subcommand(path: PathBuf) -> EposctlResult<()> {
    export_default_config(
        EnvironmentConfig::default_docker(EXPORT_PLACEHOLDER_NAME),
        &path,
        DOCKER_EXPORT_FILENAME,
    )
    .await
}

pub async fn docker_list_subcommand() -> EposctlResult<()> {
    let substrate = DockerSubstrate::connect().await?;
    print_environment_list(&management::list_environments(&substrate).await?);
    Ok(())
}

pub async fn docker_get_subcommand(name: String) -> EposctlResult<()> {
    let substrate = DockerSubstrate::connect().await?;
    let environment = management::get_environment(&substrate, &name).await?;
    print!("{}", environment.get_config().to_yaml()?);
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: Kubernetes Handlers
//--------------------------------------------------------------------------------------------------

pub async fn k8s_deploy_subcommand(
    name: String,
    context: String,
    config: Option<PathBuf>,
) -> EposctlResult<()> {
    let config = named_config(&name, config.as_deref(), EnvironmentConfig::default_k8s).await?;

    let substrate = K8sSubstrate::new(context);
    let environment =
        management::with_deadline(management::deploy(&substrate, config, false)).await?;

    print_environment(&environment);
    Ok(())
}

pub async fn k8s_update_subcommand(
    name: String,
    context: String,
    config: Option<PathBuf>,
    force: bool,
    reset: bool,
) -> EposctlResult<()> {
    let new_config = match config {
        Some(path) => Some(EnvironmentConfig::from_file(path).await?),
        None => None,
    };

    let substrate = K8sSubstrate::new(context);
    let environment = management::with_deadline(management::update(
        &substrate, &name, new_config, false, force, reset,
    ))
    .await?;

    print_environment(&environment);
    Ok(())
}

pub async fn k8s_delete_subcommand(names: Vec<String>, context: String) -> EposctlResult<()> {
    let substrate = K8sSubstrate::new(context);
    management::delete_many(&substrate, &names).await
}

pub async fn k8s_populate_subcommand(
    name: String,
    paths: Vec<PathBuf>,
    context: String,
    parallel: usize,
) -> EposctlResult<()> {
    let substrate = K8sSubstrate::new(context);
    report_ingest(management::populate(&substrate, &name, &paths, parallel).await)
}

pub async fn k8s_render_subcommand(
    name: String,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
) -> EposctlResult<()> {
    let config = named_config(&name, config.as_deref(), EnvironmentConfig::default_k8s).await?;
    config.validate()?;

    let destination = output.unwrap_or_else(|| PathBuf::from(&name));
    let bundle = render::render_k8s(&config).await?;
    bundle.install_into(&destination).await?;

    let manifest = Helm::template(
        &name,
        &name,
        &destination.join(CHART_SUBDIR),
        &destination.join(VALUES_FILENAME),
    )
    .await?;
    tokio::fs::write(destination.join(MANIFEST_FILENAME), manifest).await?;

    println!("Rendered Kubernetes artifacts into {}", destination.display());
    Ok(())
}

pub async fn k8s_export_subcommand(path: PathBuf) -> EposctlResult<()> {
    export_default_config(
        EnvironmentConfig::default_k8s(EXPORT_PLACEHOLDER_NAME),
        &path,
        K8S_EXPORT_FILENAME,
    )
    .await
}

pub async fn k8s_list_subcommand(context: String) -> EposctlResult<()> {
    let substrate = K8sSubstrate::new(context);
    print_environment_list(&management::list_environments(&substrate).await?);
    Ok(())
}

pub async fn k8s_get_subcommand(name: String, context: String) -> EposctlResult<()> {
    let substrate = K8sSubstrate::new(context);
    let environment = management::get_environment(&substrate, &name).await?;
    print!("{}", environment.get_config().to_yaml()?);
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Loads the configuration document for an operation addressed by `name`.
///
/// The positional name always wins: a document loaded from `--config` is
/// renamed to it, and without `--config` the embedded defaults are used.
async fn named_config<'a>(
    name: &'a str,
    path: Option<&Path>,
    default: impl FnOnce(&'a str) -> EnvironmentConfig,
) -> EposctlResult<EnvironmentConfig> {
    match path {
        Some(path) => {
            let mut config = EnvironmentConfig::from_file(path).await?;
            config.set_name(name);
            Ok(config)
        }
        None => Ok(default(name)),
    }
}

async fn export_default_config(
    config: EnvironmentConfig,
    directory: &Path,
    filename: &str,
) -> EposctlResult<()> {
    tokio::fs::create_dir_all(directory).await?;

    let target = directory.join(filename);
    config.save(&target).await?;

    println!("Wrote default configuration to {}", target.display());
    Ok(())
}

async fn advise_image_updates(config: &EnvironmentConfig) {
    let mut updates = 0;
    for check in management::check_image_updates(config).await {
        if let ImageStatus::UpdateAvailable { created } = check.get_status() {
            updates += 1;
            match created {
                Some(created) => println!(
                    "Newer image for {}: {} (built {})",
                    check.get_workload().literal(),
                    check.get_image(),
                    created.format("%Y-%m-%d")
                ),
                None => println!(
                    "Newer image for {}: {}",
                    check.get_workload().literal(),
                    check.get_image()
                ),
            }
        }
    }

    if updates > 0 {
        println!(
            "{} workload image(s) have updates, pass {} to pull them",
            updates,
            "--update-images".literal()
        );
    }
}

fn report_ingest(result: EposctlResult<Vec<PathBuf>>) -> EposctlResult<()> {
    match result {
        Ok(_) => Ok(()),
        Err(EposctlError::PartialIngest {
            failed,
            total,
            succeeded,
        }) => {
            for file in &succeeded {
                println!("{} {}", "ingested".valid(), file.display());
            }
            Err(EposctlError::PartialIngest {
                failed,
                total,
                succeeded,
            })
        }
        Err(error) => Err(error),
    }
}

fn print_environment_list(environments: &[Environment]) {
    if environments.is_empty() {
        println!("No environments found");
        return;
    }

    for environment in environments {
        print_environment(environment);
    }
}

fn print_environment(environment: &Environment) {
    println!("{}", environment.get_name().literal());
    println!("  GUI:        {}", environment.get_urls().get_gui());
    println!("  API:        {}", environment.get_urls().get_api());
    if let Some(backoffice) = environment.get_urls().get_backoffice() {
        println!("  Backoffice: {}", backoffice);
    }
    if let Some(directory) = environment.get_directory() {
        println!("  Directory:  {}", directory.display());
    }
    if let Some(context) = environment.get_context() {
        println!("  Context:    {}", context);
    }
}
