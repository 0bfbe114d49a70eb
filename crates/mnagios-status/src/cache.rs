//! Process-wide object cache.
//!
//! `objects.cache` only changes when Nagios reloads, so it is parsed once
//! and shared until someone invalidates it (after a reload) or forces a
//! fresh load. The live status file is never cached.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::StatusResult;
use crate::objects::ObjectConfiguration;
use crate::parser::{OBJECT_CACHE_SEPARATOR, Sections, parse_data_file};

pub struct ObjectCache {
    path: PathBuf,
    loaded: RwLock<Option<Arc<ObjectConfiguration>>>,
}

impl ObjectCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loaded: RwLock::new(None),
        }
    }

    /// A cache pre-populated with `sections` (for testing).
    pub fn from_data(sections: Sections) -> Self {
        Self {
            path: PathBuf::new(),
            loaded: RwLock::new(Some(Arc::new(ObjectConfiguration::new(sections)))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The parsed object cache, reading the file only on first use or
    /// when `force` is set.
    pub fn load(&self, force: bool) -> StatusResult<Arc<ObjectConfiguration>> {
        if !force {
            if let Some(objects) = self.current() {
                return Ok(objects);
            }
        }

        debug!(path = %self.path.display(), force, "loading object cache");
        let objects = Arc::new(ObjectConfiguration::new(parse_data_file(
            &self.path,
            OBJECT_CACHE_SEPARATOR,
        )?));
        if let Ok(mut slot) = self.loaded.write() {
            *slot = Some(Arc::clone(&objects));
        }
        Ok(objects)
    }

    /// Drop the parsed copy; the next `load` reads the file again.
    pub fn invalidate(&self) {
        if let Ok(mut slot) = self.loaded.write() {
            *slot = None;
        }
    }

    fn current(&self) -> Option<Arc<ObjectConfiguration>> {
        self.loaded.read().ok().and_then(|slot| slot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_HOST: &str = "define host {\n\thost_name\tweb1\n\taddress\t10.0.0.5\n}\n";
    const TWO_HOSTS: &str = "define host {\n\thost_name\tweb1\n\taddress\t10.0.0.5\n}\n\
                             define host {\n\thost_name\tweb2\n\taddress\t10.0.0.6\n}\n";

    #[test]
    fn loads_once_until_forced_or_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("objects.cache");
        std::fs::write(&path, ONE_HOST).unwrap();
        let cache = ObjectCache::new(&path);

        assert_eq!(cache.load(false).unwrap().hosts().len(), 1);
        std::fs::write(&path, TWO_HOSTS).unwrap();
        assert_eq!(cache.load(false).unwrap().hosts().len(), 1);
        assert_eq!(cache.load(true).unwrap().hosts().len(), 2);

        std::fs::write(&path, ONE_HOST).unwrap();
        cache.invalidate();
        assert_eq!(cache.load(false).unwrap().hosts().len(), 1);
    }

    #[test]
    fn preloaded_cache_never_touches_disk() {
        let cache = ObjectCache::from_data(crate::parser::parse_data(ONE_HOST, OBJECT_CACHE_SEPARATOR));
        assert!(cache.load(false).unwrap().has_host("web1"));
    }
}
