use std::path::{Path, PathBuf};
use std::sync::Arc;

use mnagios_core::DaemonConfig;

use crate::cache::ObjectCache;
use crate::commands::ExternalCommandWriter;
use crate::error::StatusResult;
use crate::objects::ObjectConfiguration;
use crate::status::StatusSnapshot;

/// Entry point to everything Nagios itself writes or reads at runtime.
pub struct NagiosStateReader {
    objects: Arc<ObjectCache>,
    status_file: PathBuf,
    commands: ExternalCommandWriter,
}

impl NagiosStateReader {
    pub fn new(objects: Arc<ObjectCache>, status_file: impl Into<PathBuf>, command_file: impl Into<PathBuf>) -> Self {
        Self {
            objects,
            status_file: status_file.into(),
            commands: ExternalCommandWriter::new(command_file),
        }
    }

    pub fn from_config(config: &DaemonConfig) -> Self {
        Self::new(
            Arc::new(ObjectCache::new(&config.nagios.object_cache)),
            &config.nagios.status_file,
            &config.nagios.command_file,
        )
    }

    pub fn cache(&self) -> &Arc<ObjectCache> {
        &self.objects
    }

    pub fn load_object_cache(&self, force: bool) -> StatusResult<Arc<ObjectConfiguration>> {
        self.objects.load(force)
    }

    pub fn invalidate(&self) {
        self.objects.invalidate();
    }

    /// Always read fresh.
    pub fn load_status_snapshot(&self) -> StatusResult<StatusSnapshot> {
        StatusSnapshot::load(&self.status_file)
    }

    pub fn status_file(&self) -> &Path {
        &self.status_file
    }

    pub fn commands(&self) -> &ExternalCommandWriter {
        &self.commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_configured_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DaemonConfig::default();
        config.nagios.object_cache = dir.path().join("objects.cache");
        config.nagios.status_file = dir.path().join("status.dat");
        config.nagios.command_file = dir.path().join("nagios.cmd");
        std::fs::write(
            &config.nagios.object_cache,
            "define host {\n\thost_name\tinst-1\n\taddress\t10.0.0.5\n}\n",
        )
        .unwrap();
        std::fs::write(&config.nagios.status_file, "hoststatus {\nhost_name=inst-1\ncurrent_state=0\n}\n")
            .unwrap();

        let reader = NagiosStateReader::from_config(&config);
        let objects = reader.load_object_cache(false).unwrap();
        assert_eq!(objects.host_address("inst-1"), Some("10.0.0.5"));
        assert!(reader.load_status_snapshot().unwrap().host_and_service_status("inst-1").is_host_up());

        reader.commands().schedule_host_check("inst-1").unwrap();
        assert!(config.nagios.command_file.exists());
    }
}
