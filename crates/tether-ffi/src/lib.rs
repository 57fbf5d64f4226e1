use std::ffi::c_void;
use std::ptr;
use std::slice;
use std::sync::Arc;

use log::{error, info};
use nalgebra::{Isometry3, Matrix4, Translation3, UnitQuaternion, Vector3};
use tether_core::config::{
    BeforeApplyHook, CloudAnchorMode, LightEstimationMode, NativeConfig, PlaneFindingMode,
    UpdateMode,
};
use tether_core::contracts::{
    ApkAvailability, ApkInstallPoll, ApkProvider, ArRuntime, ArSession, ConfigureOutcome,
    FrameSnapshot, ImageDatabase, InstallFailure, PermissionCallback, PermissionProvider,
    ResumeOutcome, TrackingState,
};
use tether_core::status::{InstallStatus, SessionAvailability};
use tether_core::{
    BackendError, LifecycleConfig, SessionConfiguration, SessionContext, SessionStatus,
    SharedSessionContext,
};

struct FfiContext {
    session: SharedSessionContext,
}

/// Host pointer passed back verbatim to host callbacks. The host guarantees
/// its callbacks may run on any thread.
#[derive(Debug, Copy, Clone)]
struct HostData(*mut c_void);

unsafe impl Send for HostData {}
unsafe impl Sync for HostData {}

impl HostData {
    fn get(self) -> *mut c_void {
        self.0
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TetherSessionStatus {
    Uninitialized = 0,
    RequestingRuntimeInstall = 1,
    RequestingPermission = 2,
    Resumed = 3,
    ResumedNotTracking = 4,
    Paused = 5,
    ErrorFatal = 200,
    ErrorRuntimeNotAvailable = 201,
    ErrorPermissionDenied = 202,
    ErrorConfigurationUnsupported = 203,
}

impl From<SessionStatus> for TetherSessionStatus {
    fn from(value: SessionStatus) -> Self {
        match value {
            SessionStatus::Uninitialized => TetherSessionStatus::Uninitialized,
            SessionStatus::RequestingRuntimeInstall => TetherSessionStatus::RequestingRuntimeInstall,
            SessionStatus::RequestingPermission => TetherSessionStatus::RequestingPermission,
            SessionStatus::Resumed => TetherSessionStatus::Resumed,
            SessionStatus::ResumedNotTracking => TetherSessionStatus::ResumedNotTracking,
            SessionStatus::Paused => TetherSessionStatus::Paused,
            SessionStatus::ErrorFatal => TetherSessionStatus::ErrorFatal,
            SessionStatus::ErrorRuntimeNotAvailable => TetherSessionStatus::ErrorRuntimeNotAvailable,
            SessionStatus::ErrorPermissionDenied => TetherSessionStatus::ErrorPermissionDenied,
            SessionStatus::ErrorConfigurationUnsupported => {
                TetherSessionStatus::ErrorConfigurationUnsupported
            }
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TetherTrackingState {
    Unknown = 0,
    NotTracking = 1,
    Tracking = 2,
}

impl From<TrackingState> for TetherTrackingState {
    fn from(value: TrackingState) -> Self {
        match value {
            TrackingState::Unknown => TetherTrackingState::Unknown,
            TrackingState::NotTracking => TetherTrackingState::NotTracking,
            TrackingState::Tracking => TetherTrackingState::Tracking,
        }
    }
}

impl From<TetherTrackingState> for TrackingState {
    fn from(value: TetherTrackingState) -> Self {
        match value {
            TetherTrackingState::Unknown => TrackingState::Unknown,
            TetherTrackingState::NotTracking => TrackingState::NotTracking,
            TetherTrackingState::Tracking => TrackingState::Tracking,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TetherApkAvailability {
    UnknownError = 0,
    UnknownChecking = 1,
    UnknownTimedOut = 2,
    UnsupportedDeviceNotCapable = 100,
    SupportedNotInstalled = 201,
    SupportedApkTooOld = 202,
    SupportedInstalled = 203,
}

impl From<ApkAvailability> for TetherApkAvailability {
    fn from(value: ApkAvailability) -> Self {
        match value {
            ApkAvailability::UnknownError => TetherApkAvailability::UnknownError,
            ApkAvailability::UnknownChecking => TetherApkAvailability::UnknownChecking,
            ApkAvailability::UnknownTimedOut => TetherApkAvailability::UnknownTimedOut,
            ApkAvailability::UnsupportedDeviceNotCapable => {
                TetherApkAvailability::UnsupportedDeviceNotCapable
            }
            ApkAvailability::SupportedNotInstalled => TetherApkAvailability::SupportedNotInstalled,
            ApkAvailability::SupportedApkTooOld => TetherApkAvailability::SupportedApkTooOld,
            ApkAvailability::SupportedInstalled => TetherApkAvailability::SupportedInstalled,
        }
    }
}

impl From<TetherApkAvailability> for ApkAvailability {
    fn from(value: TetherApkAvailability) -> Self {
        match value {
            TetherApkAvailability::UnknownError => ApkAvailability::UnknownError,
            TetherApkAvailability::UnknownChecking => ApkAvailability::UnknownChecking,
            TetherApkAvailability::UnknownTimedOut => ApkAvailability::UnknownTimedOut,
            TetherApkAvailability::UnsupportedDeviceNotCapable => {
                ApkAvailability::UnsupportedDeviceNotCapable
            }
            TetherApkAvailability::SupportedNotInstalled => ApkAvailability::SupportedNotInstalled,
            TetherApkAvailability::SupportedApkTooOld => ApkAvailability::SupportedApkTooOld,
            TetherApkAvailability::SupportedInstalled => ApkAvailability::SupportedInstalled,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TetherSessionAvailability {
    pub supported: bool,
    pub installed: bool,
}

impl From<SessionAvailability> for TetherSessionAvailability {
    fn from(value: SessionAvailability) -> Self {
        Self {
            supported: value.supported,
            installed: value.installed,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TetherInstallPoll {
    Pending = 0,
    Installed = 1,
    FailedDeviceNotCompatible = 2,
    FailedUserDeclined = 3,
    Failed = 4,
}

impl From<TetherInstallPoll> for ApkInstallPoll {
    fn from(value: TetherInstallPoll) -> Self {
        match value {
            TetherInstallPoll::Pending => ApkInstallPoll::Pending,
            TetherInstallPoll::Installed => ApkInstallPoll::Installed,
            TetherInstallPoll::FailedDeviceNotCompatible => {
                ApkInstallPoll::Failed(InstallFailure::DeviceNotCompatible)
            }
            TetherInstallPoll::FailedUserDeclined => {
                ApkInstallPoll::Failed(InstallFailure::UserDeclined)
            }
            TetherInstallPoll::Failed => ApkInstallPoll::Failed(InstallFailure::Other),
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TetherInstallStatus {
    Success = 100,
    Error = 200,
    ErrorDeviceNotCompatible = 201,
    ErrorUserDeclined = 203,
}

impl From<InstallStatus> for TetherInstallStatus {
    fn from(value: InstallStatus) -> Self {
        match value {
            InstallStatus::Success => TetherInstallStatus::Success,
            InstallStatus::Error => TetherInstallStatus::Error,
            InstallStatus::ErrorDeviceNotCompatible => TetherInstallStatus::ErrorDeviceNotCompatible,
            InstallStatus::ErrorUserDeclined => TetherInstallStatus::ErrorUserDeclined,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TetherConfigureOutcome {
    Success = 0,
    Unsupported = 1,
    Error = 2,
}

impl From<TetherConfigureOutcome> for ConfigureOutcome {
    fn from(value: TetherConfigureOutcome) -> Self {
        match value {
            TetherConfigureOutcome::Success => ConfigureOutcome::Success,
            TetherConfigureOutcome::Unsupported => ConfigureOutcome::Unsupported,
            TetherConfigureOutcome::Error => ConfigureOutcome::Error,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TetherResumeOutcome {
    Success = 0,
    PermissionDenied = 1,
    Error = 2,
}

impl From<TetherResumeOutcome> for ResumeOutcome {
    fn from(value: TetherResumeOutcome) -> Self {
        match value {
            TetherResumeOutcome::Success => ResumeOutcome::Success,
            TetherResumeOutcome::PermissionDenied => ResumeOutcome::PermissionDenied,
            TetherResumeOutcome::Error => ResumeOutcome::Error,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TetherUpdateMode {
    Blocking = 0,
    LatestCameraImage = 1,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TetherPlaneFindingMode {
    Disabled = 0,
    Horizontal = 1,
    Vertical = 2,
    HorizontalAndVertical = 3,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TetherLightEstimationMode {
    Disabled = 0,
    AmbientIntensity = 1,
    EnvironmentalHdr = 2,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TetherCloudAnchorMode {
    Disabled = 0,
    Enabled = 1,
}

fn update_mode_from_ffi(mode: TetherUpdateMode) -> UpdateMode {
    match mode {
        TetherUpdateMode::Blocking => UpdateMode::Blocking,
        TetherUpdateMode::LatestCameraImage => UpdateMode::LatestCameraImage,
    }
}

fn update_mode_to_ffi(mode: UpdateMode) -> TetherUpdateMode {
    match mode {
        UpdateMode::Blocking => TetherUpdateMode::Blocking,
        UpdateMode::LatestCameraImage => TetherUpdateMode::LatestCameraImage,
    }
}

fn plane_finding_from_ffi(mode: TetherPlaneFindingMode) -> PlaneFindingMode {
    match mode {
        TetherPlaneFindingMode::Disabled => PlaneFindingMode::Disabled,
        TetherPlaneFindingMode::Horizontal => PlaneFindingMode::Horizontal,
        TetherPlaneFindingMode::Vertical => PlaneFindingMode::Vertical,
        TetherPlaneFindingMode::HorizontalAndVertical => PlaneFindingMode::HorizontalAndVertical,
    }
}

fn plane_finding_to_ffi(mode: PlaneFindingMode) -> TetherPlaneFindingMode {
    match mode {
        PlaneFindingMode::Disabled => TetherPlaneFindingMode::Disabled,
        PlaneFindingMode::Horizontal => TetherPlaneFindingMode::Horizontal,
        PlaneFindingMode::Vertical => TetherPlaneFindingMode::Vertical,
        PlaneFindingMode::HorizontalAndVertical => TetherPlaneFindingMode::HorizontalAndVertical,
    }
}

fn light_estimation_from_ffi(mode: TetherLightEstimationMode) -> LightEstimationMode {
    match mode {
        TetherLightEstimationMode::Disabled => LightEstimationMode::Disabled,
        TetherLightEstimationMode::AmbientIntensity => LightEstimationMode::AmbientIntensity,
        TetherLightEstimationMode::EnvironmentalHdr => LightEstimationMode::EnvironmentalHdr,
    }
}

fn light_estimation_to_ffi(mode: LightEstimationMode) -> TetherLightEstimationMode {
    match mode {
        LightEstimationMode::Disabled => TetherLightEstimationMode::Disabled,
        LightEstimationMode::AmbientIntensity => TetherLightEstimationMode::AmbientIntensity,
        LightEstimationMode::EnvironmentalHdr => TetherLightEstimationMode::EnvironmentalHdr,
    }
}

fn cloud_anchor_from_ffi(mode: TetherCloudAnchorMode) -> CloudAnchorMode {
    match mode {
        TetherCloudAnchorMode::Disabled => CloudAnchorMode::Disabled,
        TetherCloudAnchorMode::Enabled => CloudAnchorMode::Enabled,
    }
}

fn cloud_anchor_to_ffi(mode: CloudAnchorMode) -> TetherCloudAnchorMode {
    match mode {
        CloudAnchorMode::Disabled => TetherCloudAnchorMode::Disabled,
        CloudAnchorMode::Enabled => TetherCloudAnchorMode::Enabled,
    }
}

/// Requested configuration. The image database bytes are copied during
/// `tether_set_configuration`; the caller may free them afterwards.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct TetherConfiguration {
    pub update_mode: TetherUpdateMode,
    pub plane_finding_mode: TetherPlaneFindingMode,
    pub light_estimation_mode: TetherLightEstimationMode,
    pub cloud_anchor_mode: TetherCloudAnchorMode,
    pub image_database: *const u8,
    pub image_database_len: usize,
}

impl Default for TetherConfiguration {
    fn default() -> Self {
        Self {
            update_mode: TetherUpdateMode::LatestCameraImage,
            plane_finding_mode: TetherPlaneFindingMode::Horizontal,
            light_estimation_mode: TetherLightEstimationMode::AmbientIntensity,
            cloud_anchor_mode: TetherCloudAnchorMode::Disabled,
            image_database: ptr::null(),
            image_database_len: 0,
        }
    }
}

impl TetherConfiguration {
    fn image_database_bytes(&self) -> Option<Vec<u8>> {
        if self.image_database_len == 0 || self.image_database.is_null() {
            return None;
        }

        let slice = unsafe { slice::from_raw_parts(self.image_database, self.image_database_len) };
        Some(slice.to_vec())
    }

    fn to_configuration(&self) -> SessionConfiguration {
        SessionConfiguration {
            update_mode: update_mode_from_ffi(self.update_mode),
            plane_finding_mode: plane_finding_from_ffi(self.plane_finding_mode),
            light_estimation_mode: light_estimation_from_ffi(self.light_estimation_mode),
            cloud_anchor_mode: cloud_anchor_from_ffi(self.cloud_anchor_mode),
            image_database: self.image_database_bytes(),
        }
    }
}

/// Native configuration as committed to the runtime.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct TetherNativeConfig {
    pub update_mode: TetherUpdateMode,
    pub plane_finding_mode: TetherPlaneFindingMode,
    pub light_estimation_mode: TetherLightEstimationMode,
    pub cloud_anchor_mode: TetherCloudAnchorMode,
    pub has_image_database: bool,
    pub image_database_handle: *mut c_void,
    pub image_database_count: u32,
}

impl From<&NativeConfig> for TetherNativeConfig {
    fn from(value: &NativeConfig) -> Self {
        let (has_image_database, image_database_handle, image_database_count) =
            match value.image_database.as_ref() {
                Some(database) => (
                    true,
                    database.native_handle as *mut c_void,
                    database.image_count,
                ),
                None => (false, ptr::null_mut(), 0),
            };
        Self {
            update_mode: update_mode_to_ffi(value.update_mode),
            plane_finding_mode: plane_finding_to_ffi(value.plane_finding_mode),
            light_estimation_mode: light_estimation_to_ffi(value.light_estimation_mode),
            cloud_anchor_mode: cloud_anchor_to_ffi(value.cloud_anchor_mode),
            has_image_database,
            image_database_handle,
            image_database_count,
        }
    }
}

fn native_config_from_ffi(raw: &TetherNativeConfig) -> NativeConfig {
    let image_database = raw.has_image_database.then(|| ImageDatabase {
        native_handle: raw.image_database_handle as usize,
        image_count: raw.image_database_count,
    });
    NativeConfig {
        update_mode: update_mode_from_ffi(raw.update_mode),
        plane_finding_mode: plane_finding_from_ffi(raw.plane_finding_mode),
        light_estimation_mode: light_estimation_from_ffi(raw.light_estimation_mode),
        cloud_anchor_mode: cloud_anchor_from_ffi(raw.cloud_anchor_mode),
        image_database,
    }
}

/// Column-major 4x4 homogeneous transform.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct TetherTransform {
    pub elements: [f64; 16],
}

impl Default for TetherTransform {
    fn default() -> Self {
        Self {
            elements: [0.0; 16],
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct TetherFrame {
    pub timestamp_ns: i64,
    pub tracking_state: TetherTrackingState,
    pub camera_pose: TetherTransform,
    pub native_handle: *mut c_void,
}

impl Default for TetherFrame {
    fn default() -> Self {
        Self {
            timestamp_ns: 0,
            tracking_state: TetherTrackingState::Unknown,
            camera_pose: TetherTransform::default(),
            native_handle: ptr::null_mut(),
        }
    }
}

impl From<&FrameSnapshot> for TetherFrame {
    fn from(value: &FrameSnapshot) -> Self {
        Self {
            timestamp_ns: value.timestamp_ns,
            tracking_state: value.tracking_state.into(),
            camera_pose: transform_to_ffi(&value.camera_pose),
            native_handle: value.native_handle as *mut c_void,
        }
    }
}

fn frame_from_ffi(raw: &TetherFrame) -> Option<FrameSnapshot> {
    Some(FrameSnapshot {
        timestamp_ns: raw.timestamp_ns,
        tracking_state: raw.tracking_state.into(),
        camera_pose: transform_from_ffi(&raw.camera_pose)?,
        native_handle: raw.native_handle as usize,
    })
}

fn transform_to_ffi(transform: &Isometry3<f64>) -> TetherTransform {
    let mut output = TetherTransform::default();
    let matrix = transform.to_homogeneous();
    for (idx, value) in matrix.iter().enumerate() {
        output.elements[idx] = *value;
    }
    output
}

fn transform_from_ffi(raw: &TetherTransform) -> Option<Isometry3<f64>> {
    let matrix = Matrix4::from_column_slice(&raw.elements);
    let last_row = matrix.row(3);
    if last_row[0].abs() > 1e-6 || last_row[1].abs() > 1e-6 || last_row[2].abs() > 1e-6 {
        return None;
    }
    if (last_row[3] - 1.0).abs() > 1e-6 {
        return None;
    }
    let rotation_matrix = matrix.fixed_view::<3, 3>(0, 0).into_owned();
    let translation = Vector3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);
    let rotation = UnitQuaternion::from_matrix(&rotation_matrix);
    Some(Isometry3::from_parts(Translation3::from(translation), rotation))
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct TetherLifecycleConfig {
    pub user_requested_install: bool,
    pub auto_initialize: bool,
}

impl From<TetherLifecycleConfig> for LifecycleConfig {
    fn from(value: TetherLifecycleConfig) -> Self {
        Self {
            user_requested_install: value.user_requested_install,
            auto_initialize: value.auto_initialize,
        }
    }
}

// =============================================================================
// Host collaborators
// =============================================================================

/// Opaque pending permission request. Complete it exactly once with
/// `tether_permission_request_complete`.
#[repr(C)]
pub struct TetherPermissionRequestHandle {
    _private: [u8; 0],
}

struct PermissionRequest {
    on_result: PermissionCallback,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct TetherPermissionCallbacks {
    pub user_data: *mut c_void,
    pub request_camera_permission:
        Option<extern "C" fn(user_data: *mut c_void, request: *mut TetherPermissionRequestHandle)>,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct TetherApkCallbacks {
    pub user_data: *mut c_void,
    pub check_availability: Option<extern "C" fn(user_data: *mut c_void) -> TetherApkAvailability>,
    pub request_install:
        Option<extern "C" fn(user_data: *mut c_void, user_requested: bool) -> TetherInstallPoll>,
}

/// Runtime callbacks run while the context lock is held and must not call
/// back into the context. `deserialize_image_database` and
/// `set_camera_texture_name` are optional.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct TetherRuntimeCallbacks {
    pub user_data: *mut c_void,
    pub create_session: Option<extern "C" fn(user_data: *mut c_void) -> *mut c_void>,
    pub destroy_session: Option<extern "C" fn(user_data: *mut c_void, session: *mut c_void)>,
    pub configure: Option<
        extern "C" fn(
            user_data: *mut c_void,
            session: *mut c_void,
            config: *const TetherNativeConfig,
        ) -> TetherConfigureOutcome,
    >,
    pub deserialize_image_database: Option<
        extern "C" fn(
            user_data: *mut c_void,
            session: *mut c_void,
            bytes: *const u8,
            len: usize,
            out_handle: *mut *mut c_void,
            out_image_count: *mut u32,
        ) -> bool,
    >,
    pub resume:
        Option<extern "C" fn(user_data: *mut c_void, session: *mut c_void) -> TetherResumeOutcome>,
    pub pause: Option<extern "C" fn(user_data: *mut c_void, session: *mut c_void) -> bool>,
    pub update: Option<
        extern "C" fn(user_data: *mut c_void, session: *mut c_void, out_frame: *mut TetherFrame)
            -> bool,
    >,
    pub set_camera_texture_name:
        Option<extern "C" fn(user_data: *mut c_void, session: *mut c_void, texture_name: u32)>,
}

struct FfiPermission {
    user_data: HostData,
    request: extern "C" fn(*mut c_void, *mut TetherPermissionRequestHandle),
}

impl FfiPermission {
    fn from_ffi(callbacks: &TetherPermissionCallbacks) -> Option<Self> {
        Some(Self {
            user_data: HostData(callbacks.user_data),
            request: callbacks.request_camera_permission?,
        })
    }
}

impl PermissionProvider for FfiPermission {
    fn request_camera_permission(&mut self, on_result: PermissionCallback) {
        let request = Box::into_raw(Box::new(PermissionRequest { on_result }));
        (self.request)(
            self.user_data.get(),
            request as *mut TetherPermissionRequestHandle,
        );
    }
}

struct FfiApk {
    user_data: HostData,
    check_availability: extern "C" fn(*mut c_void) -> TetherApkAvailability,
    request_install: extern "C" fn(*mut c_void, bool) -> TetherInstallPoll,
}

impl FfiApk {
    fn from_ffi(callbacks: &TetherApkCallbacks) -> Option<Self> {
        Some(Self {
            user_data: HostData(callbacks.user_data),
            check_availability: callbacks.check_availability?,
            request_install: callbacks.request_install?,
        })
    }
}

impl ApkProvider for FfiApk {
    fn check_availability(&mut self) -> ApkAvailability {
        (self.check_availability)(self.user_data.get()).into()
    }

    fn request_install(&mut self, user_requested: bool) -> ApkInstallPoll {
        (self.request_install)(self.user_data.get(), user_requested).into()
    }
}

#[derive(Copy, Clone)]
struct RuntimeFns {
    user_data: HostData,
    create_session: extern "C" fn(*mut c_void) -> *mut c_void,
    destroy_session: extern "C" fn(*mut c_void, *mut c_void),
    configure:
        extern "C" fn(*mut c_void, *mut c_void, *const TetherNativeConfig) -> TetherConfigureOutcome,
    deserialize_image_database: Option<
        extern "C" fn(*mut c_void, *mut c_void, *const u8, usize, *mut *mut c_void, *mut u32) -> bool,
    >,
    resume: extern "C" fn(*mut c_void, *mut c_void) -> TetherResumeOutcome,
    pause: extern "C" fn(*mut c_void, *mut c_void) -> bool,
    update: extern "C" fn(*mut c_void, *mut c_void, *mut TetherFrame) -> bool,
    set_camera_texture_name: Option<extern "C" fn(*mut c_void, *mut c_void, u32)>,
}

impl RuntimeFns {
    fn from_ffi(callbacks: &TetherRuntimeCallbacks) -> Option<Self> {
        Some(Self {
            user_data: HostData(callbacks.user_data),
            create_session: callbacks.create_session?,
            destroy_session: callbacks.destroy_session?,
            configure: callbacks.configure?,
            deserialize_image_database: callbacks.deserialize_image_database,
            resume: callbacks.resume?,
            pause: callbacks.pause?,
            update: callbacks.update?,
            set_camera_texture_name: callbacks.set_camera_texture_name,
        })
    }
}

struct FfiRuntime {
    fns: RuntimeFns,
}

impl ArRuntime for FfiRuntime {
    fn create_session(&mut self) -> Result<Box<dyn ArSession>, BackendError> {
        let session = (self.fns.create_session)(self.fns.user_data.get());
        if session.is_null() {
            return Err(BackendError::SessionCreation(
                "host runtime returned a null session".to_string(),
            ));
        }
        Ok(Box::new(FfiSession {
            fns: self.fns,
            session: HostData(session),
        }))
    }
}

struct FfiSession {
    fns: RuntimeFns,
    session: HostData,
}

impl ArSession for FfiSession {
    fn configure(&mut self, config: &NativeConfig) -> ConfigureOutcome {
        let raw = TetherNativeConfig::from(config);
        (self.fns.configure)(self.fns.user_data.get(), self.session.get(), &raw).into()
    }

    fn deserialize_image_database(&mut self, bytes: &[u8]) -> Result<ImageDatabase, BackendError> {
        let Some(deserialize) = self.fns.deserialize_image_database else {
            return Err(BackendError::ImageDatabase(
                "host runtime cannot load image databases".to_string(),
            ));
        };
        let mut handle = ptr::null_mut();
        let mut image_count = 0u32;
        let loaded = deserialize(
            self.fns.user_data.get(),
            self.session.get(),
            bytes.as_ptr(),
            bytes.len(),
            &mut handle,
            &mut image_count,
        );
        if !loaded {
            return Err(BackendError::ImageDatabase(format!(
                "host runtime rejected a {} byte image database",
                bytes.len()
            )));
        }
        Ok(ImageDatabase {
            native_handle: handle as usize,
            image_count,
        })
    }

    fn resume(&mut self) -> ResumeOutcome {
        (self.fns.resume)(self.fns.user_data.get(), self.session.get()).into()
    }

    fn pause(&mut self) -> Result<(), BackendError> {
        if (self.fns.pause)(self.fns.user_data.get(), self.session.get()) {
            Ok(())
        } else {
            Err(BackendError::Pause("host runtime failed to pause".to_string()))
        }
    }

    fn update(&mut self) -> Result<FrameSnapshot, BackendError> {
        let mut frame = TetherFrame::default();
        if !(self.fns.update)(self.fns.user_data.get(), self.session.get(), &mut frame) {
            return Err(BackendError::FrameUpdate(
                "host runtime produced no frame".to_string(),
            ));
        }
        frame_from_ffi(&frame).ok_or_else(|| {
            BackendError::FrameUpdate("host frame carries an invalid camera pose".to_string())
        })
    }

    fn set_camera_texture_name(&mut self, texture_name: u32) {
        if let Some(set_texture) = self.fns.set_camera_texture_name {
            set_texture(self.fns.user_data.get(), self.session.get(), texture_name);
        }
    }

    fn native_handle(&self) -> usize {
        self.session.get() as usize
    }
}

impl Drop for FfiSession {
    fn drop(&mut self) {
        (self.fns.destroy_session)(self.fns.user_data.get(), self.session.get());
    }
}

// =============================================================================
// Context API
// =============================================================================

/// Opaque handle for the session context - internal implementation hidden
#[repr(C)]
pub struct TetherContextHandle {
    _private: [u8; 0],
}

// Helper to cast pointers between opaque handle and real type
fn handle_to_context(handle: *mut TetherContextHandle) -> &'static FfiContext {
    unsafe { &*(handle as *const FfiContext) }
}

fn context_to_handle(ctx: *mut FfiContext) -> *mut TetherContextHandle {
    ctx as *mut TetherContextHandle
}

fn checked_context(handle: *mut TetherContextHandle, call: &str) -> Option<&'static FfiContext> {
    if handle.is_null() {
        error!("{call} called with a null context handle");
        return None;
    }
    Some(handle_to_context(handle))
}

#[unsafe(no_mangle)]
pub extern "C" fn tether_init_logging() {
    let initialized =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
            .try_init()
            .is_ok();
    if initialized {
        info!("tether logging initialized");
    }
}

/// Creates a session context from the host's collaborators. `config` may be
/// null to use the default lifecycle policy. Returns null when a required
/// callback is missing.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_context_create(
    permission: *const TetherPermissionCallbacks,
    apk: *const TetherApkCallbacks,
    runtime: *const TetherRuntimeCallbacks,
    config: *const TetherLifecycleConfig,
) -> *mut TetherContextHandle {
    if permission.is_null() || apk.is_null() || runtime.is_null() {
        error!("tether_context_create requires permission, apk and runtime callbacks");
        return ptr::null_mut();
    }

    let (permission, apk, runtime) = unsafe { (&*permission, &*apk, &*runtime) };
    let Some(permission) = FfiPermission::from_ffi(permission) else {
        error!("Permission callbacks are missing request_camera_permission");
        return ptr::null_mut();
    };
    let Some(apk) = FfiApk::from_ffi(apk) else {
        error!("APK callbacks are incomplete");
        return ptr::null_mut();
    };
    let Some(fns) = RuntimeFns::from_ffi(runtime) else {
        error!("Runtime callbacks are incomplete");
        return ptr::null_mut();
    };

    let config = if config.is_null() {
        LifecycleConfig::default()
    } else {
        LifecycleConfig::from(unsafe { *config })
    };

    let context = SessionContext::new(
        config,
        Box::new(permission),
        Box::new(apk),
        Box::new(FfiRuntime { fns }),
    );
    let ctx = Box::new(FfiContext {
        session: SharedSessionContext::new(context),
    });
    context_to_handle(Box::into_raw(ctx))
}

/// Destroys a session context, releasing any live runtime session
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_context_destroy(handle: *mut TetherContextHandle) {
    if handle.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(handle as *mut FfiContext));
    }
}

/// Delivers the answer to a pending permission request and frees it.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_permission_request_complete(
    request: *mut TetherPermissionRequestHandle,
    granted: bool,
) -> bool {
    if request.is_null() {
        error!("tether_permission_request_complete called with a null request");
        return false;
    }
    let request = unsafe { Box::from_raw(request as *mut PermissionRequest) };
    (request.on_result)(granted);
    true
}

/// Starts initialization. Returns false when it is already running or done.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_initialize(handle: *mut TetherContextHandle) -> bool {
    let Some(context) = checked_context(handle, "tether_initialize") else {
        return false;
    };
    context.session.initialize()
}

/// Per-frame tick
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_update(handle: *mut TetherContextHandle) -> bool {
    let Some(context) = checked_context(handle, "tether_update") else {
        return false;
    };
    context.session.update();
    true
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_set_enabled(handle: *mut TetherContextHandle, enabled: bool) -> bool {
    let Some(context) = checked_context(handle, "tether_set_enabled") else {
        return false;
    };
    context.session.set_enabled(enabled);
    true
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_handle_activity_pause(handle: *mut TetherContextHandle) -> bool {
    let Some(context) = checked_context(handle, "tether_handle_activity_pause") else {
        return false;
    };
    context.session.handle_activity_pause();
    true
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_handle_activity_resume(handle: *mut TetherContextHandle) -> bool {
    let Some(context) = checked_context(handle, "tether_handle_activity_resume") else {
        return false;
    };
    context.session.handle_activity_resume();
    true
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_set_configuration(
    handle: *mut TetherContextHandle,
    configuration: *const TetherConfiguration,
) -> bool {
    let Some(context) = checked_context(handle, "tether_set_configuration") else {
        return false;
    };
    if configuration.is_null() {
        error!("tether_set_configuration called with a null configuration");
        return false;
    }
    let configuration = unsafe { &*configuration }.to_configuration();
    context.session.set_configuration(&configuration);
    true
}

/// Installs (or clears, when `hook` is null) the callback that may edit the
/// native configuration right before it is committed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_set_before_apply_hook(
    handle: *mut TetherContextHandle,
    hook: Option<extern "C" fn(user_data: *mut c_void, config: *mut TetherNativeConfig)>,
    user_data: *mut c_void,
) -> bool {
    let Some(context) = checked_context(handle, "tether_set_before_apply_hook") else {
        return false;
    };
    let user_data = HostData(user_data);
    let hook: Option<BeforeApplyHook> = hook.map(|hook| {
        Arc::new(move |config: &mut NativeConfig| {
            let mut raw = TetherNativeConfig::from(&*config);
            hook(user_data.get(), &mut raw);
            *config = native_config_from_ffi(&raw);
        }) as BeforeApplyHook
    });
    context.session.set_before_apply_hook(hook);
    true
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_set_camera_texture_name(
    handle: *mut TetherContextHandle,
    texture_name: u32,
) -> bool {
    let Some(context) = checked_context(handle, "tether_set_camera_texture_name") else {
        return false;
    };
    context.session.set_camera_texture_name(texture_name);
    true
}

/// Destroys the live session and disables the context
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_reset(handle: *mut TetherContextHandle) -> bool {
    let Some(context) = checked_context(handle, "tether_reset") else {
        return false;
    };
    context.session.reset();
    true
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_get_status(handle: *mut TetherContextHandle) -> TetherSessionStatus {
    let Some(context) = checked_context(handle, "tether_get_status") else {
        return TetherSessionStatus::Uninitialized;
    };
    context.session.status().into()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_get_tracking_state(
    handle: *mut TetherContextHandle,
) -> TetherTrackingState {
    let Some(context) = checked_context(handle, "tether_get_tracking_state") else {
        return TetherTrackingState::Unknown;
    };
    context.session.tracking_state().into()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_is_configuration_supported(handle: *mut TetherContextHandle) -> bool {
    let Some(context) = checked_context(handle, "tether_is_configuration_supported") else {
        return false;
    };
    context.session.is_configuration_supported()
}

/// Returns the host's native session pointer, or null without a live session
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_get_native_session(handle: *mut TetherContextHandle) -> *mut c_void {
    let Some(context) = checked_context(handle, "tether_get_native_session") else {
        return ptr::null_mut();
    };
    context
        .session
        .native_session_handle()
        .map_or(ptr::null_mut(), |session| session as *mut c_void)
}

/// Copies the latest frame. Returns false when there is none.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_get_frame(
    handle: *mut TetherContextHandle,
    out_frame: *mut TetherFrame,
) -> bool {
    let Some(context) = checked_context(handle, "tether_get_frame") else {
        return false;
    };
    if out_frame.is_null() {
        return false;
    }
    let Some(frame) = context.session.frame() else {
        return false;
    };
    unsafe {
        *out_frame = TetherFrame::from(&frame);
    }
    true
}

/// Queues an availability check. `on_result` runs during a later
/// `tether_update`, after the context lock is released.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_check_apk_availability(
    handle: *mut TetherContextHandle,
    on_result: Option<extern "C" fn(user_data: *mut c_void, availability: TetherApkAvailability)>,
    user_data: *mut c_void,
) -> bool {
    let Some(context) = checked_context(handle, "tether_check_apk_availability") else {
        return false;
    };
    let Some(on_result) = on_result else {
        error!("tether_check_apk_availability called without a callback");
        return false;
    };
    let user_data = HostData(user_data);
    context
        .session
        .check_apk_availability(move |availability| on_result(user_data.get(), availability.into()));
    true
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_request_apk_installation(
    handle: *mut TetherContextHandle,
    user_requested: bool,
    on_result: Option<extern "C" fn(user_data: *mut c_void, status: TetherInstallStatus)>,
    user_data: *mut c_void,
) -> bool {
    let Some(context) = checked_context(handle, "tether_request_apk_installation") else {
        return false;
    };
    let Some(on_result) = on_result else {
        error!("tether_request_apk_installation called without a callback");
        return false;
    };
    let user_data = HostData(user_data);
    context
        .session
        .request_apk_installation(user_requested, move |status| {
            on_result(user_data.get(), status.into())
        });
    true
}

/// Maps an availability code to the engine-facing supported/installed pair
#[unsafe(no_mangle)]
pub extern "C" fn tether_session_availability(
    availability: TetherApkAvailability,
) -> TetherSessionAvailability {
    SessionAvailability::from(ApkAvailability::from(availability)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

    const GRANT: i32 = 1;
    const DENY: i32 = 0;
    const HOLD: i32 = -1;

    struct Host {
        permission: AtomicI32,
        held: Mutex<Vec<usize>>,
        permission_calls: AtomicU32,
        install_polls: AtomicU32,
        created: AtomicU32,
        destroyed: AtomicU32,
        frames: AtomicU32,
        texture: AtomicU32,
        plane_modes: Mutex<Vec<TetherPlaneFindingMode>>,
        databases: Mutex<Vec<Vec<u8>>>,
        availability: Mutex<Vec<TetherApkAvailability>>,
        install_results: Mutex<Vec<TetherInstallStatus>>,
    }

    impl Host {
        fn new(permission: i32) -> Box<Self> {
            Box::new(Self {
                permission: AtomicI32::new(permission),
                held: Mutex::new(Vec::new()),
                permission_calls: AtomicU32::new(0),
                install_polls: AtomicU32::new(0),
                created: AtomicU32::new(0),
                destroyed: AtomicU32::new(0),
                frames: AtomicU32::new(0),
                texture: AtomicU32::new(0),
                plane_modes: Mutex::new(Vec::new()),
                databases: Mutex::new(Vec::new()),
                availability: Mutex::new(Vec::new()),
                install_results: Mutex::new(Vec::new()),
            })
        }

        fn user_data(&self) -> *mut c_void {
            self as *const Host as *mut c_void
        }
    }

    fn host(user_data: *mut c_void) -> &'static Host {
        unsafe { &*(user_data as *const Host) }
    }

    extern "C" fn request_permission(user_data: *mut c_void, request: *mut TetherPermissionRequestHandle) {
        let host = host(user_data);
        host.permission_calls.fetch_add(1, Ordering::SeqCst);
        match host.permission.load(Ordering::SeqCst) {
            GRANT => unsafe {
                tether_permission_request_complete(request, true);
            },
            DENY => unsafe {
                tether_permission_request_complete(request, false);
            },
            _ => host.held.lock().unwrap().push(request as usize),
        }
    }

    extern "C" fn check_availability(_user_data: *mut c_void) -> TetherApkAvailability {
        TetherApkAvailability::SupportedInstalled
    }

    extern "C" fn request_install(user_data: *mut c_void, _user_requested: bool) -> TetherInstallPoll {
        host(user_data).install_polls.fetch_add(1, Ordering::SeqCst);
        TetherInstallPoll::Installed
    }

    extern "C" fn create_session(user_data: *mut c_void) -> *mut c_void {
        let created = host(user_data).created.fetch_add(1, Ordering::SeqCst) + 1;
        (0x7000 + created as usize) as *mut c_void
    }

    extern "C" fn destroy_session(user_data: *mut c_void, _session: *mut c_void) {
        host(user_data).destroyed.fetch_add(1, Ordering::SeqCst);
    }

    extern "C" fn configure(
        user_data: *mut c_void,
        _session: *mut c_void,
        config: *const TetherNativeConfig,
    ) -> TetherConfigureOutcome {
        let config = unsafe { &*config };
        host(user_data)
            .plane_modes
            .lock()
            .unwrap()
            .push(config.plane_finding_mode);
        TetherConfigureOutcome::Success
    }

    extern "C" fn load_database(
        user_data: *mut c_void,
        _session: *mut c_void,
        bytes: *const u8,
        len: usize,
        out_handle: *mut *mut c_void,
        out_image_count: *mut u32,
    ) -> bool {
        let bytes = unsafe { std::slice::from_raw_parts(bytes, len) }.to_vec();
        host(user_data).databases.lock().unwrap().push(bytes);
        unsafe {
            *out_handle = 0xdb as *mut c_void;
            *out_image_count = 1;
        }
        true
    }

    extern "C" fn resume(_user_data: *mut c_void, _session: *mut c_void) -> TetherResumeOutcome {
        TetherResumeOutcome::Success
    }

    extern "C" fn pause(_user_data: *mut c_void, _session: *mut c_void) -> bool {
        true
    }

    extern "C" fn update(user_data: *mut c_void, session: *mut c_void, out_frame: *mut TetherFrame) -> bool {
        let frames = host(user_data).frames.fetch_add(1, Ordering::SeqCst) + 1;
        let mut elements = [0.0; 16];
        elements[0] = 1.0;
        elements[5] = 1.0;
        elements[10] = 1.0;
        elements[15] = 1.0;
        elements[12] = 0.25;
        unsafe {
            *out_frame = TetherFrame {
                timestamp_ns: i64::from(frames) * 1_000,
                tracking_state: TetherTrackingState::Tracking,
                camera_pose: TetherTransform { elements },
                native_handle: session,
            };
        }
        true
    }

    extern "C" fn set_texture(user_data: *mut c_void, _session: *mut c_void, texture_name: u32) {
        host(user_data).texture.store(texture_name, Ordering::SeqCst);
    }

    extern "C" fn on_availability(user_data: *mut c_void, availability: TetherApkAvailability) {
        host(user_data).availability.lock().unwrap().push(availability);
    }

    extern "C" fn on_install(user_data: *mut c_void, status: TetherInstallStatus) {
        host(user_data).install_results.lock().unwrap().push(status);
    }

    extern "C" fn vertical_planes(_user_data: *mut c_void, config: *mut TetherNativeConfig) {
        unsafe {
            (*config).plane_finding_mode = TetherPlaneFindingMode::Vertical;
        }
    }

    fn callbacks(
        host: &Host,
    ) -> (TetherPermissionCallbacks, TetherApkCallbacks, TetherRuntimeCallbacks) {
        let user_data = host.user_data();
        (
            TetherPermissionCallbacks {
                user_data,
                request_camera_permission: Some(request_permission),
            },
            TetherApkCallbacks {
                user_data,
                check_availability: Some(check_availability),
                request_install: Some(request_install),
            },
            TetherRuntimeCallbacks {
                user_data,
                create_session: Some(create_session),
                destroy_session: Some(destroy_session),
                configure: Some(configure),
                deserialize_image_database: Some(load_database),
                resume: Some(resume),
                pause: Some(pause),
                update: Some(update),
                set_camera_texture_name: Some(set_texture),
            },
        )
    }

    fn create(host: &Host) -> *mut TetherContextHandle {
        let (permission, apk, runtime) = callbacks(host);
        let handle = unsafe { tether_context_create(&permission, &apk, &runtime, ptr::null()) };
        assert!(!handle.is_null());
        handle
    }

    fn start(handle: *mut TetherContextHandle) {
        let configuration = TetherConfiguration::default();
        unsafe {
            assert!(tether_set_configuration(handle, &configuration));
            assert!(tether_set_camera_texture_name(handle, 17));
            assert!(tether_set_enabled(handle, true));
            assert!(tether_update(handle));
        }
    }

    #[test]
    fn create_rejects_incomplete_runtime_callbacks() {
        let host = Host::new(GRANT);
        let (permission, apk, mut runtime) = callbacks(&host);
        runtime.update = None;
        let handle = unsafe { tether_context_create(&permission, &apk, &runtime, ptr::null()) };
        assert!(handle.is_null());

        let handle = unsafe { tether_context_create(&permission, ptr::null(), &runtime, ptr::null()) };
        assert!(handle.is_null());
    }

    #[test]
    fn enabled_context_resumes_and_exposes_frames() {
        let host = Host::new(GRANT);
        let handle = create(&host);
        start(handle);

        unsafe {
            assert_eq!(tether_get_status(handle), TetherSessionStatus::Resumed);
            assert_eq!(tether_get_tracking_state(handle), TetherTrackingState::Tracking);
            assert!(tether_is_configuration_supported(handle));

            let session = tether_get_native_session(handle);
            assert_eq!(session as usize, 0x7001);

            let mut frame = TetherFrame::default();
            assert!(tether_get_frame(handle, &mut frame));
            assert_eq!(frame.native_handle, session);
            assert_eq!(frame.timestamp_ns, 1_000);
            assert_relative_eq!(frame.camera_pose.elements[12], 0.25);
            assert_relative_eq!(frame.camera_pose.elements[15], 1.0);

            tether_context_destroy(handle);
        }
        assert_eq!(host.texture.load(Ordering::SeqCst), 17);
        assert_eq!(host.install_polls.load(Ordering::SeqCst), 1);
        assert_eq!(host.destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn configuration_keeps_its_own_copy_of_the_database() {
        let host = Host::new(GRANT);
        let handle = create(&host);

        let mut buffer = vec![4_u8, 5, 6];
        let configuration = TetherConfiguration {
            image_database: buffer.as_ptr(),
            image_database_len: buffer.len(),
            ..TetherConfiguration::default()
        };
        unsafe {
            assert!(tether_set_configuration(handle, &configuration));
        }
        buffer.fill(0);
        drop(buffer);

        unsafe {
            assert!(tether_set_camera_texture_name(handle, 17));
            assert!(tether_set_enabled(handle, true));
            assert!(tether_update(handle));
            assert_eq!(tether_get_status(handle), TetherSessionStatus::Resumed);

            assert!(tether_reset(handle));
            assert!(tether_set_enabled(handle, true));
            assert!(tether_update(handle));
            assert_eq!(tether_get_status(handle), TetherSessionStatus::Resumed);
            tether_context_destroy(handle);
        }
        assert_eq!(host.created.load(Ordering::SeqCst), 2);
        assert_eq!(
            *host.databases.lock().unwrap(),
            vec![vec![4_u8, 5, 6], vec![4_u8, 5, 6]]
        );
    }

    #[test]
    fn held_permission_completes_from_host() {
        let host = Host::new(HOLD);
        let handle = create(&host);
        start(handle);

        unsafe {
            assert_eq!(tether_get_status(handle), TetherSessionStatus::RequestingPermission);
            let request = host.held.lock().unwrap().pop().unwrap();
            assert!(tether_permission_request_complete(
                request as *mut TetherPermissionRequestHandle,
                true
            ));
            assert_eq!(tether_get_status(handle), TetherSessionStatus::Resumed);
            tether_context_destroy(handle);
        }
        assert_eq!(host.permission_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn denied_permission_surfaces_error() {
        let host = Host::new(DENY);
        let handle = create(&host);
        start(handle);
        unsafe {
            assert_eq!(tether_get_status(handle), TetherSessionStatus::ErrorPermissionDenied);
            assert!(tether_get_native_session(handle).is_null());
            tether_context_destroy(handle);
        }
        assert_eq!(host.created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn null_handles_are_rejected() {
        let handle = ptr::null_mut();
        let mut frame = TetherFrame::default();
        unsafe {
            assert!(!tether_update(handle));
            assert!(!tether_initialize(handle));
            assert!(!tether_set_enabled(handle, true));
            assert!(!tether_get_frame(handle, &mut frame));
            assert!(!tether_permission_request_complete(ptr::null_mut(), true));
            assert_eq!(tether_get_status(handle), TetherSessionStatus::Uninitialized);
            assert_eq!(tether_get_tracking_state(handle), TetherTrackingState::Unknown);
            assert!(tether_get_native_session(handle).is_null());
            tether_context_destroy(handle);
        }
    }

    #[test]
    fn apk_callbacks_run_after_update() {
        let host = Host::new(GRANT);
        let handle = create(&host);
        unsafe {
            assert!(tether_check_apk_availability(
                handle,
                Some(on_availability),
                host.user_data()
            ));
            assert!(tether_request_apk_installation(
                handle,
                true,
                Some(on_install),
                host.user_data()
            ));
            assert!(!tether_check_apk_availability(handle, None, host.user_data()));
            assert!(host.availability.lock().unwrap().is_empty());

            assert!(tether_update(handle));
            tether_context_destroy(handle);
        }
        assert_eq!(
            *host.availability.lock().unwrap(),
            vec![TetherApkAvailability::SupportedInstalled]
        );
        assert_eq!(
            *host.install_results.lock().unwrap(),
            vec![TetherInstallStatus::Success]
        );
    }

    #[test]
    fn before_apply_hook_edits_committed_config() {
        let host = Host::new(GRANT);
        let handle = create(&host);
        unsafe {
            assert!(tether_set_before_apply_hook(
                handle,
                Some(vertical_planes),
                ptr::null_mut()
            ));
        }
        start(handle);
        unsafe {
            tether_context_destroy(handle);
        }
        assert_eq!(
            *host.plane_modes.lock().unwrap(),
            vec![TetherPlaneFindingMode::Vertical]
        );
    }

    #[test]
    fn reset_releases_session_and_next_enable_rebuilds_it() {
        let host = Host::new(GRANT);
        let handle = create(&host);
        start(handle);
        unsafe {
            assert!(tether_reset(handle));
            assert_eq!(host.destroyed.load(Ordering::SeqCst), 1);
            assert!(tether_get_native_session(handle).is_null());

            assert!(tether_set_enabled(handle, true));
            assert!(tether_update(handle));
            assert_eq!(tether_get_native_session(handle) as usize, 0x7002);
            tether_context_destroy(handle);
        }
        assert_eq!(host.destroyed.load(Ordering::SeqCst), 2);
        assert_eq!(host.permission_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transform_with_projective_row_is_rejected() {
        let mut raw = transform_to_ffi(&Isometry3::identity());
        assert!(transform_from_ffi(&raw).is_some());
        raw.elements[3] = 0.5;
        assert!(transform_from_ffi(&raw).is_none());
    }

    #[test]
    fn session_availability_follows_runtime_codes() {
        let availability = tether_session_availability(TetherApkAvailability::SupportedApkTooOld);
        assert!(availability.supported);
        assert!(!availability.installed);
        let availability = tether_session_availability(TetherApkAvailability::UnknownTimedOut);
        assert!(!availability.supported);
    }
}
