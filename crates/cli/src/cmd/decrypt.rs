//! Decrypt a single artifact with the configured key

use anyhow::{Context, Result};
use engine::{Cipher, OpensslCipher};
use owo_colors::OwoColorize;
use std::path::Path;
use strongbox_core::{BackupConfig, KeyMaterial};

pub async fn run(config: &BackupConfig, artifact: &Path, output: &Path) -> Result<()> {
    if !artifact.is_file() {
        anyhow::bail!("Artifact not found: {}", artifact.display());
    }
    if output.exists() {
        anyhow::bail!("Refusing to overwrite {}", output.display());
    }

    let layout = config.layout();
    let key = KeyMaterial::open(layout.key_file())?;
    let cipher = OpensslCipher::from_config(config);

    cipher
        .decrypt(artifact, output, &key)
        .await
        .with_context(|| format!("Failed to decrypt {}", artifact.display()))?;

    println!(
        "{} Decrypted {} -> {}",
        "✓".green(),
        artifact.display(),
        output.display().to_string().cyan()
    );
    Ok(())
}
