//! Parser for the block-structured files Nagios writes.
//!
//! Both the compiled object cache (`define host {` blocks, tab separated)
//! and the status file (`hoststatus {` blocks, `=` separated) use the same
//! shape:
//!
//! ```text
//! define host {
//!     host_name	web1
//!     address	10.0.0.5
//! }
//! ```
//!
//! Blank lines and anything outside a block are ignored. Values are
//! left-trimmed; a line with no separator is a key with an empty value;
//! a repeated key keeps the last value.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{StatusError, StatusResult};

/// Separator used by `objects.cache`.
pub const OBJECT_CACHE_SEPARATOR: char = '\t';
/// Separator used by `status.dat`.
pub const STATUS_SEPARATOR: char = '=';

/// One block's fields.
pub type Record = BTreeMap<String, String>;

/// Blocks grouped by type, in file order.
pub type Sections = BTreeMap<String, Vec<Record>>;

const DEFINE_PREFIX: &str = "define ";

pub fn parse_data(text: &str, separator: char) -> Sections {
    let mut sections = Sections::new();
    let mut current: Option<(String, Record)> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.ends_with('{') {
            let header = line.strip_prefix(DEFINE_PREFIX).unwrap_or(line);
            let name = header
                .trim_end_matches('{')
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string();
            current = Some((name, Record::new()));
        } else if line == "}" {
            if let Some((name, record)) = current.take() {
                sections.entry(name).or_default().push(record);
            }
        } else if let Some((_, record)) = current.as_mut() {
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once(separator).unwrap_or((line, ""));
            record.insert(key.to_string(), value.trim_start().to_string());
        }
    }
    sections
}

pub fn parse_data_file(path: &Path, separator: char) -> StatusResult<Sections> {
    let text = std::fs::read_to_string(path).map_err(|source| StatusError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_data(&text, separator))
}
