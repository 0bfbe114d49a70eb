//! Reading fields back out of deployed object definitions.
//!
//! Deployed files are the desired state; the object cache lags until the
//! next reload. Decisions about what is still referenced are made from
//! the files.

/// Value of the first `key` directive in an object definition.
pub fn field<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    text.lines().find_map(|line| {
        let line = line.trim();
        let (name, value) = line.split_once(char::is_whitespace)?;
        (name == key).then(|| value.trim())
    })
}

/// Hostgroups a host definition joins.
pub fn hostgroups(text: &str) -> Vec<&str> {
    field(text, "hostgroups")
        .map(|groups| groups.split(',').map(str::trim).filter(|g| !g.is_empty()).collect())
        .unwrap_or_default()
}
