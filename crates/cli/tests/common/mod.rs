//! Common utilities for integration tests

pub mod fakes;

use chrono::{DateTime, Duration, TimeZone, Utc};
use cli_lib::Pipeline;
use parking_lot::Mutex;
use std::fs;
use std::sync::Arc;
use strongbox_core::segment::list_files;
use strongbox_core::{BackupConfig, BackupLayout};
use tempfile::TempDir;

pub use fakes::{FakeCipher, FakeEngine, FakeServices, SharedClock};

/// A data store, backup directory and lock directory under one temp dir
pub struct TestSystem {
    _temp: TempDir,
    pub config: BackupConfig,
    pub clock: SharedClock,
    pub engine: FakeEngine,
    pub services: FakeServices,
    pub cipher: FakeCipher,
}

impl TestSystem {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let mut config = BackupConfig::default();
        config.storage_root = root.join("user-data");
        config.lock_dir = root.join("lock");
        config.engine.scratch_dir = root.join("scratch");
        config.validate().unwrap();

        fs::create_dir_all(config.storage_root.join("mail")).unwrap();
        fs::write(config.storage_root.join("mail/inbox"), b"hello").unwrap();

        let start = Utc.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap();
        let clock: SharedClock = Arc::new(Mutex::new(start));
        let engine = FakeEngine::new(clock.clone(), config.engine.scratch_dir.clone());

        let system = Self {
            _temp: temp,
            config,
            clock,
            engine,
            services: FakeServices::default(),
            cipher: FakeCipher::default(),
        };
        system.write_key();
        system
    }

    pub fn layout(&self) -> BackupLayout {
        self.config.layout()
    }

    pub fn write_key(&self) {
        let layout = self.layout();
        fs::create_dir_all(layout.backup_dir()).unwrap();
        fs::write(layout.key_file(), "passphrase").unwrap();
    }

    pub fn remove_key(&self) {
        fs::remove_file(self.layout().key_file()).unwrap();
    }

    pub fn advance(&self, days: i64) {
        let mut now = self.clock.lock();
        *now += Duration::days(days);
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.clock.lock()
    }

    pub fn pipeline(&self) -> Pipeline<'_> {
        let clock = self.clock.clone();
        Pipeline::new(&self.config, &self.engine, &self.services, &self.cipher)
            .with_clock(move || *clock.lock())
    }

    pub fn segments(&self) -> Vec<String> {
        list_files(&self.layout().snapshot_store()).unwrap().into_iter().collect()
    }

    pub fn artifacts(&self) -> Vec<String> {
        list_files(&self.layout().artifact_store()).unwrap().into_iter().collect()
    }
}
