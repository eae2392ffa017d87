// demos/mirror_tree.rs
// Run with: cargo run --example mirror_tree

use std::path::Path;

use buildferry::{CancellationToken, ConnectionConfig, Credential, Transfer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Describe the deployment target
    let config = ConnectionConfig {
        host: "example.com".to_string(),
        port: 22,
        username: "deploy".to_string(),
        credential: Credential::PrivateKeyFile("/home/user/.ssh/id_ed25519".into()),
    };

    // 2. Mirror a local build output directory to the server
    let transfer = Transfer::new(config);
    let report = transfer
        .transfer(Path::new("./dist"), "/var/www/site", CancellationToken::new())
        .await?;

    // 3. Inspect the per-file manifest
    println!(
        "uploaded {} files into {} directories",
        report.uploaded_count(),
        report.directories
    );
    for file in &report.files {
        println!("  {} -> {}", file.local_path.display(), file.remote_path);
    }

    Ok(())
}
