// Dispatcher settings

use crate::path_helper::PathHelper;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Behaviour switches of a [`Dispatcher`](crate::Dispatcher).
///
/// Every field has a default, so partial configuration files deserialize:
///
/// ```rust
/// use switchyard_core::DispatcherConfig;
///
/// let config: DispatcherConfig =
///     serde_json::from_str(r#"{"throw_if_no_handler_found": true}"#).unwrap();
/// assert!(config.throw_if_no_handler_found);
/// assert!(config.cleanup_after_include);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Raise `NoHandlerFound` instead of answering 404.
    pub throw_if_no_handler_found: bool,
    /// Restore request attributes after an include dispatch.
    pub cleanup_after_include: bool,
    /// Let `/users` patterns match `/users/`.
    pub use_trailing_slash_match: bool,
    /// Resolve named handlers on first lookup rather than at registration.
    pub lazy_init_handlers: bool,
    pub url_decode: bool,
    pub remove_semicolon_content: bool,
    /// Match against the full path, ignoring the context path.
    pub always_use_full_path: bool,
    /// Use every registered mapping; `false` keeps only the first.
    pub detect_all_handler_mappings: bool,
    pub flash_map_timeout_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            throw_if_no_handler_found: false,
            cleanup_after_include: true,
            use_trailing_slash_match: false,
            lazy_init_handlers: false,
            url_decode: true,
            remove_semicolon_content: true,
            always_use_full_path: false,
            detect_all_handler_mappings: true,
            flash_map_timeout_secs: 180,
        }
    }
}

impl DispatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path helper configured from the lookup-path switches.
    pub fn path_helper(&self) -> PathHelper {
        PathHelper {
            always_use_full_path: self.always_use_full_path,
            url_decode: self.url_decode,
            remove_semicolon_content: self.remove_semicolon_content,
        }
    }

    pub fn flash_map_timeout(&self) -> Duration {
        Duration::from_secs(self.flash_map_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatcherConfig::default();
        assert!(!config.throw_if_no_handler_found);
        assert!(config.detect_all_handler_mappings);
        assert_eq!(config.flash_map_timeout(), Duration::from_secs(180));
        assert!(config.path_helper().url_decode);
    }

    #[test]
    fn test_partial_deserialize() {
        let config: DispatcherConfig =
            serde_json::from_str(r#"{"always_use_full_path": true, "flash_map_timeout_secs": 5}"#).unwrap();
        assert!(config.path_helper().always_use_full_path);
        assert_eq!(config.flash_map_timeout_secs, 5);
        assert!(config.remove_semicolon_content);
    }
}
