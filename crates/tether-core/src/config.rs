use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::contracts::ImageDatabase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    Blocking,
    #[default]
    LatestCameraImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaneFindingMode {
    Disabled,
    #[default]
    Horizontal,
    Vertical,
    HorizontalAndVertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightEstimationMode {
    Disabled,
    #[default]
    AmbientIntensity,
    EnvironmentalHdr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudAnchorMode {
    #[default]
    Disabled,
    Enabled,
}

/// Requested session configuration. Cloning copies the image database bytes,
/// so a stored configuration never depends on the caller's buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionConfiguration {
    #[serde(default)]
    pub update_mode: UpdateMode,
    #[serde(default)]
    pub plane_finding_mode: PlaneFindingMode,
    #[serde(default)]
    pub light_estimation_mode: LightEstimationMode,
    #[serde(default)]
    pub cloud_anchor_mode: CloudAnchorMode,
    #[serde(default)]
    pub image_database: Option<Vec<u8>>,
}

/// Mutable configuration object handed to the runtime on commit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NativeConfig {
    pub update_mode: UpdateMode,
    pub plane_finding_mode: PlaneFindingMode,
    pub light_estimation_mode: LightEstimationMode,
    pub cloud_anchor_mode: CloudAnchorMode,
    pub image_database: Option<ImageDatabase>,
}

/// Hook run after the requested settings are written into the native
/// configuration and before it is committed.
pub type BeforeApplyHook = Arc<dyn Fn(&mut NativeConfig) + Send + Sync + 'static>;

/// Lifecycle policy owned by the session context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Passed as `user_requested` to the install request issued during
    /// initialization.
    #[serde(default = "default_true")]
    pub user_requested_install: bool,
    /// Start initialization automatically once the session is enabled.
    #[serde(default = "default_true")]
    pub auto_initialize: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            user_requested_install: true,
            auto_initialize: true,
        }
    }
}
