use std::path::PathBuf;
use std::process::ExitCode;

use buildferry::{DeployConfig, ProjectBuilder};
use clap::Parser;
use tracing::{Level, error};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Builds configured projects in containers and ships the artifacts over SFTP"
)]
struct Args {
    /// Project to build and deploy; all configured projects when omitted
    project: Option<String>,

    /// Path to the deployment config file
    #[arg(short, long, default_value = "deploy.json")]
    config: PathBuf,

    /// Print debug-level logs
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Suppress non-error messages
    #[arg(short, long, default_value_t = false)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    // Logs go to stderr so piped output stays clean.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let config = match DeployConfig::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    if !ProjectBuilder::docker_available().await {
        error!("docker is not available, install a container runtime before deploying");
        return ExitCode::FAILURE;
    }

    let success = match args.project.as_deref() {
        Some(name) => {
            let Some(project) = config.project(name).cloned() else {
                error!("project \"{name}\" not found in config");
                return ExitCode::FAILURE;
            };
            ProjectBuilder::new(config).build_project(&project).await
        }
        None => {
            let builder = ProjectBuilder::new(config);
            match builder.build_all().await {
                Ok(all_succeeded) => all_succeeded,
                Err(err) => {
                    error!("{err}");
                    false
                }
            }
        }
    };

    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
