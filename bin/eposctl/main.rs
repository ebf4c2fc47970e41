mod handlers;

use clap::Parser;
use eposctl::{
    cli::{AnsiStyles, DockerCommand, EposctlArgs, K8sCommand, SubstrateCommand},
    EposctlResult,
};
use tracing_subscriber::{fmt, EnvFilter};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    let args = EposctlArgs::parse();
    init_tracing(args.verbose);

    if let Err(error) = run(args.substrate).await {
        print_error_chain(&error);
        std::process::exit(1);
    }
}

async fn run(command: SubstrateCommand) -> EposctlResult<()> {
    match command {
        SubstrateCommand::Docker(command) => match command {
            DockerCommand::Deploy {
                name,
                config,
                update_images,
            } => {
                handlers::docker_deploy_subcommand(name, config, update_images).await?;
            }
            DockerCommand::Update {
                name,
                config,
                force,
                reset,
                update_images,
            } => {
                handlers::docker_update_subcommand(name, config, force, reset, update_images)
                    .await?;
            }
            DockerCommand::Clean { name } => {
                handlers::docker_clean_subcommand(name).await?;
            }
            DockerCommand::Delete { names } => {
                handlers::docker_delete_subcommand(names).await?;
            }
            DockerCommand::Populate {
                name,
                paths,
                parallel,
            } => {
                handlers::docker_populate_subcommand(name, paths, parallel).await?;
            }
            DockerCommand::Render {
                name,
                config,
                output,
            } => {
                handlers::docker_render_subcommand(name, config, output).await?;
            }
            DockerCommand::Export { path } => {
                handlers::docker_export_subcommand(path).await?;
            }
            DockerCommand::List => {
                handlers::docker_list_subcommand().await?;
            }
            DockerCommand::Get { name } => {
                handlers::docker_get_subcommand(name).await?;
            }
        },
        SubstrateCommand::K8s(command) => match command {
            K8sCommand::Deploy {
                name,
                context,
                config,
            } => {
                handlers::k8s_deploy_subcommand(name, context, config).await?;
            }
            K8sCommand::Update {
                name,
                context,
                config,
                force,
                reset,
            } => {
                handlers::k8s_update_subcommand(name, context, config, force, reset).await?;
            }
            K8sCommand::Delete { names, context } => {
                handlers::k8s_delete_subcommand(names, context).await?;
            }
            K8sCommand::Populate {
                name,
                paths,
                context,
                parallel,
            } => {
                handlers::k8s_populate_subcommand(name, paths, context, parallel).await?;
            }
            K8sCommand::Render {
                name,
                config,
                output,
            } => {
                handlers::k8s_render_subcommand(name, config, output).await?;
            }
            K8sCommand::Export { path } => {
                handlers::k8s_export_subcommand(path).await?;
            }
            K8sCommand::List { context } => {
                handlers::k8s_list_subcommand(context).await?;
            }
            K8sCommand::Get { name, context } => {
                handlers::k8s_get_subcommand(name, context).await?;
            }
        },
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };

    fmt()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .init();
}

fn print_error_chain(error: &dyn std::error::Error) {
    eprintln!("{} {}", "error:".error(), error);

    let mut source = error.source();
    while let Some(cause) = source {
        eprintln!("  {} {}", "caused by:".error(), cause);
        source = cause.source();
    }
}
