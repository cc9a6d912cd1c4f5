use serde::{Deserialize, Serialize};

use crate::diag::{LayoutResult, error};

/// Knobs that influence layout.
///
/// Settings are plain data and can be loaded from TOML:
///
/// ```
/// # use quire_layout::Settings;
/// let settings = Settings::from_toml("browse-mode = true").unwrap();
/// assert!(settings.browse_mode);
/// assert_eq!(settings.max_format_depth, 50);
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Settings {
    /// Online layout: sections may always grow and join their follows.
    pub browse_mode: bool,
    /// Compatibility flag: when a section grows without a next sibling, the
    /// next frame in flow order is invalidated too, because object wrapping
    /// can pull content back onto an earlier page.
    pub consider_wrap_on_object_position: bool,
    /// How deeply section formatting may nest before it bails out.
    pub max_format_depth: usize,
    /// The maximum number of layout passes per [`run`](crate::Layout::run).
    pub max_passes: usize,
}

impl Settings {
    /// Parse settings from a TOML document. Missing keys keep their defaults.
    pub fn from_toml(text: &str) -> LayoutResult<Self> {
        toml::from_str(text).map_err(|err| {
            error!(Config, "failed to parse settings: {}", err.message().trim())
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            browse_mode: false,
            consider_wrap_on_object_position: false,
            max_format_depth: 50,
            max_passes: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::ErrorKind;

    #[test]
    fn test_settings_from_toml() {
        let settings = Settings::from_toml(
            "consider-wrap-on-object-position = true\nmax-passes = 8\n",
        )
        .unwrap();
        assert!(settings.consider_wrap_on_object_position);
        assert!(!settings.browse_mode);
        assert_eq!(settings.max_passes, 8);
        assert_eq!(settings.max_format_depth, 50);
    }

    #[test]
    fn test_settings_reject_unknown_keys() {
        let err = Settings::from_toml("columns = 3").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
        assert!(err.message.starts_with("failed to parse settings"));
    }
}
