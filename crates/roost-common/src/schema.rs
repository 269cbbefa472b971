//! Schema versioning and reserved names.

/// Current version of the table layout handed to sinks.
///
/// Follows semver: MAJOR.MINOR.PATCH
/// - MAJOR: Breaking changes (reserved column changes, type mapping changes)
/// - MINOR: Additive changes (new column types)
/// - PATCH: Bug fixes, documentation
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Reserved row-label column carried by every ledger and batch table.
pub const INDEX_COLUMN: &str = "index";

/// Check if a schema version is compatible with current.
pub fn is_compatible(version: &str) -> bool {
    let major = |v: &str| {
        v.split('.')
            .next()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0)
    };

    major(SCHEMA_VERSION) == major(version)
}
