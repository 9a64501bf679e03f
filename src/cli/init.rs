//! `zentest init`: scaffold a project directory.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

const CONFIG_TEMPLATE: &str = r#"# Zentest configuration
baseUrl: http://localhost:3000

# provider: anthropic | openai | openrouter
provider: anthropic

# environments:
#   staging:
#     url: https://staging.example.com

maxSteps: 50
viewport:
  width: 1280
  height: 720
headless: auto
"#;

const EXAMPLE_SUITE: &str = r#"# example

## homepage-loads
Open the homepage and verify the main heading is visible.
"#;

const GITIGNORE: &str = "runs/\n";

pub async fn cmd_init(dir: &Path) -> Result<()> {
    let tests_dir = dir.join("tests");
    tokio::fs::create_dir_all(&tests_dir)
        .await
        .context("failed to create tests directory")?;

    write_if_absent(&dir.join("zentest.yaml"), CONFIG_TEMPLATE).await?;
    write_if_absent(&tests_dir.join("example.md"), EXAMPLE_SUITE).await?;
    write_if_absent(&dir.join(".gitignore"), GITIGNORE).await?;

    info!(dir = %dir.display(), "scaffolded zentest project");
    println!("Initialized zentest project in {}", dir.display());
    println!("Edit tests/example.md, set ZENTEST_ANTHROPIC_API_KEY, then run `zentest run`.");
    Ok(())
}

async fn write_if_absent(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        info!(path = %path.display(), "already exists, leaving as-is");
        return Ok(());
    }
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
