//! Namespaced custom ids: `plugin:group:component`

use sha2::{Digest, Sha256};

use crate::application::errors::ComponentError;

pub const SEPARATOR: char = ':';

/// Hex characters kept from the digest when the component segment is hashed
pub const HASH_LEN: usize = 10;

/// A custom id split back into its segments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedId<'a> {
    pub plugin: &'a str,
    pub group: &'a str,
    /// Local component id, or its hash when the id had to be shortened
    pub component: &'a str,
}

/// Plugin and group segments must be non-empty and free of the separator
pub fn validate_segment(segment: &str) -> Result<(), ComponentError> {
    if segment.is_empty() || segment.contains(SEPARATOR) {
        return Err(ComponentError::InvalidId(segment.to_string()));
    }
    Ok(())
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(HASH_LEN);
    hash
}

/// Compile the custom id of one element.
///
/// When the plain concatenation exceeds `limit` bytes, the component segment
/// is replaced by a hash of the full candidate, which stays stable for the
/// same inputs.
pub fn compile(plugin: &str, group: &str, component: &str, limit: usize) -> Result<String, ComponentError> {
    validate_segment(plugin)?;
    validate_segment(group)?;
    if component.is_empty() {
        return Err(ComponentError::InvalidId(component.to_string()));
    }

    let candidate = format!("{plugin}{SEPARATOR}{group}{SEPARATOR}{component}");
    if candidate.len() <= limit {
        return Ok(candidate);
    }

    let shortened = format!("{plugin}{SEPARATOR}{group}{SEPARATOR}{}", short_hash(&candidate));
    if shortened.len() > limit {
        return Err(ComponentError::IdTooLong {
            plugin: plugin.to_string(),
            group: group.to_string(),
            limit,
        });
    }
    Ok(shortened)
}

/// Split a custom id; `None` for ids this registry could not have produced
pub fn parse(custom_id: &str) -> Option<ParsedId<'_>> {
    let mut parts = custom_id.splitn(3, SEPARATOR);
    let plugin = parts.next().filter(|s| !s.is_empty())?;
    let group = parts.next().filter(|s| !s.is_empty())?;
    let component = parts.next().filter(|s| !s.is_empty())?;
    Some(ParsedId {
        plugin,
        group,
        component,
    })
}
