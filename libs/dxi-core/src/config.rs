//! Process-wide configuration read from environment variables.
//!
//! The core itself only consumes [`use_build_root`] and [`root_prefix`]
//! when resolving bundled data paths.  The plugin path lists are exposed
//! for host-language bindings; their interpretation belongs to the
//! bindings, not to this crate.  The error-related variables
//! (`ERR_FAIL_MODE`, `ERR_STREAM`) are handled in [`crate::errors`].

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Default installation prefix used when `DLITE_ROOT` is not set.
const DEFAULT_ROOT: &str = "/usr/local";

fn env_bool(name: &str) -> bool {
    match std::env::var(name) {
        Ok(v) => !matches!(
            v.to_ascii_lowercase().as_str(),
            "" | "0" | "no" | "false" | "off"
        ),
        Err(_) => false,
    }
}

fn env_paths(name: &str) -> Vec<PathBuf> {
    match std::env::var_os(name) {
        Some(v) => std::env::split_paths(&v).collect(),
        None => Vec::new(),
    }
}

/// Returns whether paths should refer to the build root instead of the
/// installation root.  Controlled by `DLITE_USE_BUILD_ROOT`.
pub fn use_build_root() -> bool {
    static V: OnceLock<bool> = OnceLock::new();
    *V.get_or_init(|| env_bool("DLITE_USE_BUILD_ROOT"))
}

/// Returns the installation prefix.  May be overridden with `DLITE_ROOT`.
pub fn root_prefix() -> &'static Path {
    static V: OnceLock<PathBuf> = OnceLock::new();
    V.get_or_init(|| {
        std::env::var_os("DLITE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT))
    })
}

/// Path list from `DLITE_PYTHON_STORAGE_PLUGIN_DIRS`.
pub fn python_storage_plugin_dirs() -> &'static [PathBuf] {
    static V: OnceLock<Vec<PathBuf>> = OnceLock::new();
    V.get_or_init(|| env_paths("DLITE_PYTHON_STORAGE_PLUGIN_DIRS"))
}

/// Path list from `DLITE_PYTHON_MAPPING_PLUGIN_DIRS`.
pub fn python_mapping_plugin_dirs() -> &'static [PathBuf] {
    static V: OnceLock<Vec<PathBuf>> = OnceLock::new();
    V.get_or_init(|| env_paths("DLITE_PYTHON_MAPPING_PLUGIN_DIRS"))
}

/// Path list from `DLITE_PYTHON_PROTOCOL_PLUGIN_DIRS`.
pub fn python_protocol_plugin_dirs() -> &'static [PathBuf] {
    static V: OnceLock<Vec<PathBuf>> = OnceLock::new();
    V.get_or_init(|| env_paths("DLITE_PYTHON_PROTOCOL_PLUGIN_DIRS"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_parsing() {
        std::env::remove_var("DXI_TEST_BOOL");
        assert!(!env_bool("DXI_TEST_BOOL"));
        std::env::set_var("DXI_TEST_BOOL", "1");
        assert!(env_bool("DXI_TEST_BOOL"));
        std::env::set_var("DXI_TEST_BOOL", "False");
        assert!(!env_bool("DXI_TEST_BOOL"));
        std::env::remove_var("DXI_TEST_BOOL");
    }

    #[test]
    fn default_prefix() {
        // Only check the fallback when the override is absent.
        if std::env::var_os("DLITE_ROOT").is_none() {
            assert_eq!(root_prefix(), Path::new(DEFAULT_ROOT));
        }
    }
}
