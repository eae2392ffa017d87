// demos/deploy_pipeline.rs
// Run with: cargo run --example deploy_pipeline
//
// Full pipeline: clone each configured project, build it in a container and
// ship the artifacts, concurrently, the same way the CLI does.

use std::path::Path;

use buildferry::{DeployConfig, ProjectBuilder};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let config = DeployConfig::load(Path::new("deploy.json"))?;

    if !ProjectBuilder::docker_available().await {
        eprintln!("docker is not available");
        std::process::exit(1);
    }

    let builder = ProjectBuilder::new(config);
    let all_succeeded = builder.build_all().await?;

    std::process::exit(if all_succeeded { 0 } else { 1 });
}
