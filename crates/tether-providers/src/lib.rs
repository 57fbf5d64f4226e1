mod frame;
mod simulated;

pub use frame::{FrameConverter, RuntimeFrame, RuntimePose};
pub use simulated::{
    DeviceCounters, DeviceProfile, PermissionPolicy, SimulatedApk, SimulatedDevice,
    SimulatedPermission, SimulatedRuntime,
};
