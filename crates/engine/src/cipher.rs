//! Symmetric cipher interface and the openssl adapter

use crate::runner::{Invocation, ProcessRunner};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use strongbox_core::config::timeout_from_secs;
use strongbox_core::{BackupConfig, BackupError, KeyMaterial, Result};

/// Encrypts individual files. Output naming is the caller's responsibility.
#[async_trait]
pub trait Cipher: Send + Sync {
    async fn encrypt(&self, input: &Path, output: &Path, key: &KeyMaterial) -> Result<()>;

    async fn decrypt(&self, input: &Path, output: &Path, key: &KeyMaterial) -> Result<()>;
}

/// `openssl enc -<algorithm> -a -salt -in <in> -out <out> -pass file:<key>`
#[derive(Debug, Clone)]
pub struct OpensslCipher {
    program: PathBuf,
    algorithm: String,
    runner: ProcessRunner,
}

impl OpensslCipher {
    pub fn new(program: PathBuf, algorithm: String, runner: ProcessRunner) -> Self {
        Self {
            program,
            algorithm,
            runner,
        }
    }

    pub fn from_config(config: &BackupConfig) -> Self {
        Self::new(
            config.cipher.program.clone(),
            config.cipher.algorithm.clone(),
            ProcessRunner::new(timeout_from_secs(config.cipher.timeout_secs)),
        )
    }

    pub fn invocation(
        &self,
        input: &Path,
        output: &Path,
        key: &KeyMaterial,
        decrypt: bool,
    ) -> Invocation {
        let mut inv = Invocation::new(&self.program)
            .arg("enc")
            .arg(format!("-{}", self.algorithm));
        if decrypt {
            inv = inv.arg("-d");
        }
        inv.arg("-a")
            .arg("-salt")
            .arg("-in")
            .arg(input)
            .arg("-out")
            .arg(output)
            .arg("-pass")
            .arg(format!("file:{}", key.path().display()))
    }

    async fn run(&self, inv: Invocation, output: &Path) -> Result<()> {
        let artifact = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| output.display().to_string());

        self.runner.run(&inv).await.map(|_| ()).map_err(|e| {
            let what = format!("cipher for {}", artifact);
            e.into_backup_error(what, |reason| BackupError::Encryption { artifact, reason })
        })
    }
}

#[async_trait]
impl Cipher for OpensslCipher {
    async fn encrypt(&self, input: &Path, output: &Path, key: &KeyMaterial) -> Result<()> {
        self.run(self.invocation(input, output, key, false), output).await
    }

    async fn decrypt(&self, input: &Path, output: &Path, key: &KeyMaterial) -> Result<()> {
        self.run(self.invocation(input, output, key, true), output).await
    }
}
