use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, anyhow, bail};
use tokio::fs;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{DeployConfig, ProjectConfig};
use crate::transfer::Transfer;

/// Clones, builds and ships the configured projects.
///
/// Builds run inside throwaway containers; shipping goes through one
/// [`Transfer`] per project, each with its own session, so projects can be
/// built concurrently without shared state.
pub struct ProjectBuilder {
    config: DeployConfig,
}

impl ProjectBuilder {
    pub fn new(config: DeployConfig) -> Self {
        Self { config }
    }

    /// Probes for a usable container runtime.
    pub async fn docker_available() -> bool {
        Command::new("docker")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Builds and deploys every configured project concurrently, then prints
    /// a per-project summary. Returns whether all of them succeeded.
    pub async fn build_all(&self) -> Result<bool, anyhow::Error> {
        info!("starting build for {} projects", self.config.projects.len());
        fs::create_dir_all(&self.config.work_dir)
            .await
            .with_context(|| {
                format!("cannot create work dir {}", self.config.work_dir.display())
            })?;

        let results = futures::future::join_all(self.config.projects.iter().map(|project| {
            let name = project.name.clone();
            async move { (name, self.build_project(project).await) }
        }))
        .await;

        info!("build summary:");
        for (name, success) in &results {
            info!("  {} {name}", if *success { "ok    " } else { "failed" });
        }

        if !self.config.keep_temp_files {
            fs::remove_dir_all(&self.config.work_dir).await.ok();
        }

        Ok(results.iter().all(|(_, success)| *success))
    }

    /// Builds and deploys one project. Failures are logged and reported as
    /// `false` so sibling projects keep running.
    pub async fn build_project(&self, project: &ProjectConfig) -> bool {
        match self.try_build(project).await {
            Ok(()) => true,
            Err(err) => {
                error!(project = %project.name, error = %err, "build failed");
                false
            }
        }
    }

    async fn try_build(&self, project: &ProjectConfig) -> Result<(), anyhow::Error> {
        info!(project = %project.name, "starting build");
        fs::create_dir_all(&self.config.work_dir).await?;
        let checkout = self.clone_project(project).await?;
        let artifacts = self.build_in_container(project, &checkout).await?;

        let transfer = Transfer::new(self.config.service.clone());
        let report = transfer
            .transfer(&artifacts, &project.remote_path, CancellationToken::new())
            .await?;
        if let Some(cause) = &report.failure {
            bail!(
                "upload finished with {} of {} files failed: {cause}",
                report.failed_count(),
                report.files.len()
            );
        }
        info!(
            project = %project.name,
            files = report.uploaded_count(),
            "artifacts shipped"
        );

        if !self.config.keep_temp_files {
            fs::remove_dir_all(&checkout).await.ok();
            fs::remove_dir_all(&artifacts).await.ok();
        }
        Ok(())
    }

    async fn clone_project(&self, project: &ProjectConfig) -> Result<PathBuf, anyhow::Error> {
        let checkout = self.config.work_dir.join(&project.name);
        if fs::metadata(&checkout).await.is_ok() {
            fs::remove_dir_all(&checkout).await?;
        }
        info!(project = %project.name, url = %project.git_url, "cloning repository");
        let checkout_arg = checkout.display().to_string();
        run_command("git", &["clone", &project.git_url, &checkout_arg], None).await?;
        Ok(checkout)
    }

    async fn build_in_container(
        &self,
        project: &ProjectConfig,
        checkout: &Path,
    ) -> Result<PathBuf, anyhow::Error> {
        let output_dir = self.config.work_dir.join(format!("{}-output", project.name));
        if fs::metadata(&output_dir).await.is_ok() {
            fs::remove_dir_all(&output_dir).await?;
        }
        fs::create_dir_all(&output_dir).await?;

        info!(
            project = %project.name,
            node = %project.node_version,
            "building in container"
        );
        fs::write(checkout.join("Dockerfile"), render_dockerfile(project)).await?;

        let image = format!("frontend-build-{}", project.name.to_lowercase());
        let checkout_arg = checkout.display().to_string();
        run_command(
            "docker",
            &["build", "-t", &image, &checkout_arg],
            Some(checkout),
        )
        .await?;

        // The image copies its build output into /output at run time; bind
        // mounts need an absolute host path.
        let mount_dir = fs::canonicalize(&output_dir).await?;
        let mount_arg = format!("{}:/output", mount_dir.display());
        run_command("docker", &["run", "--rm", "-v", &mount_arg, &image], None).await?;
        run_command("docker", &["rmi", &image], None).await?;

        Ok(output_dir)
    }
}

async fn run_command(
    program: &str,
    args: &[&str],
    current_dir: Option<&Path>,
) -> Result<(), anyhow::Error> {
    info!(command = %format!("{program} {}", args.join(" ")), "running");
    let mut command = Command::new(program);
    command.args(args);
    if let Some(dir) = current_dir {
        command.current_dir(dir);
    }
    let status = command
        .status()
        .await
        .with_context(|| format!("cannot run `{program}`"))?;
    if !status.success() {
        return Err(anyhow!("`{program}` exited with {status}"));
    }
    Ok(())
}

/// Install command derived from the build command's package manager.
fn install_command(build_command: &str) -> &'static str {
    if build_command.contains("yarn") {
        "yarn install"
    } else if build_command.contains("pnpm") {
        "pnpm install"
    } else {
        "npm install"
    }
}

fn render_dockerfile(project: &ProjectConfig) -> String {
    format!(
        r##"FROM node:{version}-alpine

WORKDIR /app

COPY . .

RUN npm -v
RUN {install}
RUN {build}

RUN echo "#!/bin/sh" > /start.sh && \
    echo "cp -r {output}/* /output/" >> /start.sh && \
    chmod +x /start.sh

CMD ["/start.sh"]
"##,
        version = project.node_version,
        install = install_command(&project.build_command),
        build = project.build_command,
        output = project.output_dir,
    )
}
