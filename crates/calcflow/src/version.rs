//! Version information.

/// Get the version string.
#[must_use]
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Name and version, as sent in the request `Framework` field.
#[must_use]
pub fn framework() -> String {
    format!("calcflow/{}", version())
}
