//! Live status snapshot (`status.dat`), re-read on every request.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::StatusResult;
use crate::objects::ObjectConfiguration;
use crate::parser::{Record, STATUS_SEPARATOR, Sections, parse_data_file};

const OK_STATE: &str = "0";

/// Host state plus its services split by state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostStatus {
    /// `current_state` of the host, if it has a status record.
    pub host_state: Option<String>,
    pub healthy: Vec<String>,
    pub failing: Vec<String>,
}

impl HostStatus {
    pub fn is_host_up(&self) -> bool {
        self.host_state.as_deref() == Some(OK_STATE)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    sections: Sections,
}

impl StatusSnapshot {
    pub fn new(sections: Sections) -> Self {
        Self { sections }
    }

    pub fn load(path: &Path) -> StatusResult<Self> {
        Ok(Self::new(parse_data_file(path, STATUS_SEPARATOR)?))
    }

    pub fn section(&self, name: &str) -> &[Record] {
        self.sections.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn services_for_host(&self, host_name: &str) -> Vec<&Record> {
        self.section("servicestatus")
            .iter()
            .filter(|s| s.get("host_name").map(String::as_str) == Some(host_name))
            .collect()
    }

    pub fn host_and_service_status(&self, host_name: &str) -> HostStatus {
        let host_state = self
            .section("hoststatus")
            .iter()
            .find(|h| h.get("host_name").map(String::as_str) == Some(host_name))
            .and_then(|h| h.get("current_state"))
            .cloned();

        let mut status = HostStatus {
            host_state,
            ..Default::default()
        };
        for service in self.services_for_host(host_name) {
            let description = service
                .get("service_description")
                .cloned()
                .unwrap_or_default();
            if service.get("current_state").map(String::as_str) == Some(OK_STATE) {
                status.healthy.push(description);
            } else {
                status.failing.push(description);
            }
        }
        status
    }

    /// Status of every member of `hostgroup`.
    pub fn hostgroup_status(&self, objects: &ObjectConfiguration, hostgroup: &str) -> BTreeMap<String, HostStatus> {
        objects
            .hostgroup_members(hostgroup)
            .into_iter()
            .map(|host| {
                let status = self.host_and_service_status(&host);
                (host, status)
            })
            .collect()
    }

    /// Host comments left by `author`, as `(comment_id, entry_time)`.
    pub fn host_comments_by(&self, author: &str) -> Vec<(String, u64)> {
        self.section("hostcomment")
            .iter()
            .filter(|c| c.get("author").map(String::as_str) == Some(author))
            .filter_map(|c| {
                let id = c.get("comment_id")?.clone();
                let entry_time = c.get("entry_time")?.parse().ok()?;
                Some((id, entry_time))
            })
            .collect()
    }
}
