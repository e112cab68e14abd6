//! Configuration types for the workflow editor

use serde::{Deserialize, Serialize};

/// Default configuration values
pub mod defaults {
    /// Number of undoable commands kept; older entries are dropped
    pub const HISTORY_LIMIT: usize = 1000;
    /// Display name given to new group nodes
    pub const GROUP_NAME: &str = "Group";
}

/// Layered layout passes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Order each layer by successor position and argument index
    pub sort_edge_labels: bool,
    /// Pad layers with spacers to straighten branches and merges
    pub remove_successor_kinks: bool,
    /// Lay out single-node components side by side in one row
    pub batch_trivial_components: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            sort_edge_labels: true,
            remove_successor_kinks: true,
            batch_trivial_components: true,
        }
    }
}

/// Editor session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Maximum undo history length (`None` keeps everything)
    pub history_limit: Option<usize>,
    /// Display name for newly created groups
    pub default_group_name: String,
    pub layout: LayoutConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_limit: Some(defaults::HISTORY_LIMIT),
            default_group_name: defaults::GROUP_NAME.to_string(),
            layout: LayoutConfig::default(),
        }
    }
}

impl EditorConfig {
    /// Parse a JSON configuration document; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
