use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tether_core::contracts::{
    ApkAvailability, ApkInstallPoll, ConfigureOutcome, ResumeOutcome, TrackingState,
};
use tether_core::status::InstallStatus;
use tether_core::{
    LifecycleConfig, SessionConfiguration, SessionContext, SessionStatus, SharedSessionContext,
};
use tether_providers::{DeviceCounters, DeviceProfile, PermissionPolicy, SimulatedDevice};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse scenario JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("scenario is invalid: {0}")]
    InvalidScenario(String),
}

/// A scripted run: the simulated device, the lifecycle policy and the host
/// events to replay against a fresh session.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub device: DeviceProfile,
    pub steps: Vec<ScenarioStep>,
    #[serde(default)]
    pub expect_final: Option<CounterExpectation>,
    #[serde(default)]
    pub expect_availability_results: Option<Vec<ApkAvailability>>,
    #[serde(default)]
    pub expect_install_results: Option<Vec<InstallStatus>>,
}

impl Scenario {
    fn validate(&self) -> Result<(), ScenarioError> {
        if self.steps.is_empty() {
            return Err(ScenarioError::InvalidScenario(
                "scenario must contain at least one step".to_string(),
            ));
        }

        for (index, step) in self.steps.iter().enumerate() {
            match &step.action {
                ScenarioAction::Update { repeat } if *repeat == 0 => {
                    return Err(ScenarioError::InvalidScenario(format!(
                        "update repeat must be positive (step {index})"
                    )));
                }
                ScenarioAction::Device { patch } if patch.install.as_ref().is_some_and(Vec::is_empty) => {
                    return Err(ScenarioError::InvalidScenario(format!(
                        "install script must not be empty (step {index})"
                    )));
                }
                ScenarioAction::ResolvePermission { .. }
                    if self.device.permission != PermissionPolicy::Prompt
                        && !self.steps[..index].iter().any(ScenarioStep::sets_prompt) =>
                {
                    return Err(ScenarioError::InvalidScenario(format!(
                        "resolve_permission needs the prompt permission policy (step {index})"
                    )));
                }
                _ => {}
            }
        }

        if self.device.install.is_empty() {
            return Err(ScenarioError::InvalidScenario(
                "device install script must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioStep {
    #[serde(flatten)]
    pub action: ScenarioAction,
    #[serde(default)]
    pub expect: Option<SessionStatus>,
    #[serde(default)]
    pub expect_tracking: Option<TrackingState>,
    #[serde(default)]
    pub expect_session_live: Option<bool>,
    #[serde(default)]
    pub expect_counters: Option<CounterExpectation>,
}

impl ScenarioStep {
    fn sets_prompt(&self) -> bool {
        matches!(
            &self.action,
            ScenarioAction::Device { patch } if patch.permission == Some(PermissionPolicy::Prompt)
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioAction {
    Initialize,
    Update {
        #[serde(default = "default_repeat")]
        repeat: u32,
    },
    SetEnabled {
        enabled: bool,
    },
    ActivityPause,
    ActivityResume,
    SetConfiguration {
        #[serde(default)]
        configuration: SessionConfiguration,
    },
    SetCameraTexture {
        texture_name: u32,
    },
    Reset,
    ResolvePermission {
        granted: bool,
    },
    CheckAvailability,
    RequestInstall {
        #[serde(default)]
        user_requested: bool,
    },
    Device {
        patch: DevicePatch,
    },
}

fn default_repeat() -> u32 {
    1
}

impl ScenarioAction {
    pub fn label(&self) -> &'static str {
        match self {
            ScenarioAction::Initialize => "initialize",
            ScenarioAction::Update { .. } => "update",
            ScenarioAction::SetEnabled { .. } => "set_enabled",
            ScenarioAction::ActivityPause => "activity_pause",
            ScenarioAction::ActivityResume => "activity_resume",
            ScenarioAction::SetConfiguration { .. } => "set_configuration",
            ScenarioAction::SetCameraTexture { .. } => "set_camera_texture",
            ScenarioAction::Reset => "reset",
            ScenarioAction::ResolvePermission { .. } => "resolve_permission",
            ScenarioAction::CheckAvailability => "check_availability",
            ScenarioAction::RequestInstall { .. } => "request_install",
            ScenarioAction::Device { .. } => "device",
        }
    }
}

/// Partial edit of the simulated device applied mid-run.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DevicePatch {
    #[serde(default)]
    pub availability: Option<ApkAvailability>,
    #[serde(default)]
    pub install: Option<Vec<ApkInstallPoll>>,
    #[serde(default)]
    pub permission: Option<PermissionPolicy>,
    #[serde(default)]
    pub configure: Option<ConfigureOutcome>,
    #[serde(default)]
    pub resume: Option<ResumeOutcome>,
    #[serde(default)]
    pub tracking: Option<TrackingState>,
    #[serde(default)]
    pub fail_pause: Option<bool>,
    #[serde(default)]
    pub fail_frame_update: Option<bool>,
    #[serde(default)]
    pub fail_session_creation: Option<bool>,
}

impl DevicePatch {
    fn apply(&self, profile: &mut DeviceProfile) {
        if let Some(availability) = self.availability {
            profile.availability = availability;
        }
        if let Some(install) = self.install.as_ref() {
            profile.install = install.clone();
        }
        if let Some(permission) = self.permission {
            profile.permission = permission;
        }
        if let Some(configure) = self.configure {
            profile.configure = configure;
        }
        if let Some(resume) = self.resume {
            profile.resume = resume;
        }
        if let Some(tracking) = self.tracking {
            profile.tracking = tracking;
        }
        if let Some(fail_pause) = self.fail_pause {
            profile.fail_pause = fail_pause;
        }
        if let Some(fail_frame_update) = self.fail_frame_update {
            profile.fail_frame_update = fail_frame_update;
        }
        if let Some(fail_session_creation) = self.fail_session_creation {
            profile.fail_session_creation = fail_session_creation;
        }
    }
}

/// Expected device call counts. Unset fields are not checked.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CounterExpectation {
    #[serde(default)]
    pub permission_requests: Option<u32>,
    #[serde(default)]
    pub availability_checks: Option<u32>,
    #[serde(default)]
    pub install_polls: Option<u32>,
    #[serde(default)]
    pub sessions_created: Option<u32>,
    #[serde(default)]
    pub sessions_destroyed: Option<u32>,
    #[serde(default)]
    pub live_sessions: Option<u32>,
    #[serde(default)]
    pub configures: Option<u32>,
    #[serde(default)]
    pub resumes: Option<u32>,
    #[serde(default)]
    pub pauses: Option<u32>,
}

impl CounterExpectation {
    fn check(&self, counters: &DeviceCounters, context: &str, failures: &mut Vec<String>) {
        let checks = [
            ("permission_requests", self.permission_requests, counters.permission_requests),
            ("availability_checks", self.availability_checks, counters.availability_checks),
            ("install_polls", self.install_polls, counters.install_polls),
            ("sessions_created", self.sessions_created, counters.sessions_created),
            ("sessions_destroyed", self.sessions_destroyed, counters.sessions_destroyed),
            ("live_sessions", self.live_sessions, counters.live_sessions()),
            ("configures", self.configures, counters.configures),
            ("resumes", self.resumes, counters.resumes),
            ("pauses", self.pauses, counters.pauses),
        ];
        for (name, expected, actual) in checks {
            if let Some(expected) = expected {
                if expected != actual {
                    failures.push(format!("{context}: expected {name} {expected}, got {actual}"));
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub action: String,
    pub status: SessionStatus,
    pub tracking_state: TrackingState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub scenario_name: String,
    pub step_count: usize,
    pub steps: Vec<StepRecord>,
    pub final_status: SessionStatus,
    pub counters: DeviceCounters,
    pub availability_results: Vec<ApkAvailability>,
    pub install_results: Vec<InstallStatus>,
    pub failures: Vec<String>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn load_scenario(path: impl AsRef<Path>) -> Result<Scenario, ScenarioError> {
    let path = path.as_ref();
    let payload = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let scenario: Scenario = serde_json::from_str(&payload)?;
    scenario.validate()?;
    Ok(scenario)
}

pub fn evaluate_scenario_path(path: impl AsRef<Path>) -> Result<ScenarioReport, ScenarioError> {
    let scenario = load_scenario(path)?;
    evaluate_scenario(&scenario)
}

pub fn evaluate_scenario(scenario: &Scenario) -> Result<ScenarioReport, ScenarioError> {
    scenario.validate()?;
    info!("Replaying scenario '{}'", scenario.name);

    let device = SimulatedDevice::new(scenario.device.clone());
    let session = SharedSessionContext::new(SessionContext::new(
        scenario.lifecycle.clone(),
        Box::new(device.permission()),
        Box::new(device.apk()),
        Box::new(device.runtime()),
    ));

    let availability_results = Arc::new(Mutex::new(Vec::new()));
    let install_results = Arc::new(Mutex::new(Vec::new()));
    let mut steps = Vec::with_capacity(scenario.steps.len());
    let mut failures = Vec::new();

    for (index, step) in scenario.steps.iter().enumerate() {
        debug!("Step {index}: {}", step.action.label());
        match &step.action {
            ScenarioAction::Initialize => {
                session.initialize();
            }
            ScenarioAction::Update { repeat } => {
                for _ in 0..*repeat {
                    session.update();
                }
            }
            ScenarioAction::SetEnabled { enabled } => session.set_enabled(*enabled),
            ScenarioAction::ActivityPause => session.handle_activity_pause(),
            ScenarioAction::ActivityResume => session.handle_activity_resume(),
            ScenarioAction::SetConfiguration { configuration } => {
                session.set_configuration(configuration)
            }
            ScenarioAction::SetCameraTexture { texture_name } => {
                session.set_camera_texture_name(*texture_name)
            }
            ScenarioAction::Reset => session.reset(),
            ScenarioAction::ResolvePermission { granted } => {
                if device.resolve_permission(*granted) == 0 {
                    failures.push(format!(
                        "step {index} (resolve_permission): no permission prompt was pending"
                    ));
                }
            }
            ScenarioAction::CheckAvailability => {
                let sink = availability_results.clone();
                session.check_apk_availability(move |availability| {
                    sink.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(availability);
                });
            }
            ScenarioAction::RequestInstall { user_requested } => {
                let sink = install_results.clone();
                session.request_apk_installation(*user_requested, move |status| {
                    sink.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(status);
                });
            }
            ScenarioAction::Device { patch } => device.update_profile(|profile| patch.apply(profile)),
        }

        let status = session.status();
        let tracking_state = session.tracking_state();
        let label = format!("step {index} ({})", step.action.label());

        if let Some(expected) = step.expect {
            if expected != status {
                failures.push(format!("{label}: expected status {expected}, got {status}"));
            }
        }
        if let Some(expected) = step.expect_tracking {
            if expected != tracking_state {
                failures.push(format!(
                    "{label}: expected tracking {expected:?}, got {tracking_state:?}"
                ));
            }
        }
        if let Some(expected) = step.expect_session_live {
            let live = session.native_session_handle().is_some();
            if expected != live {
                failures.push(format!("{label}: expected live session {expected}, got {live}"));
            }
        }
        if let Some(expected) = step.expect_counters.as_ref() {
            expected.check(&device.counters(), &label, &mut failures);
        }

        steps.push(StepRecord {
            index,
            action: step.action.label().to_string(),
            status,
            tracking_state,
        });
    }

    let final_status = session.status();
    let counters = device.counters();
    if let Some(expected) = scenario.expect_final.as_ref() {
        expected.check(&counters, "final", &mut failures);
    }

    // Release the live session before reporting lifetime counters.
    drop(session);
    let counters_after_teardown = device.counters();
    if counters_after_teardown.live_sessions() != 0 {
        failures.push(format!(
            "teardown leaked {} session(s)",
            counters_after_teardown.live_sessions()
        ));
    }

    let availability_results = availability_results
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    let install_results = install_results
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    if let Some(expected) = scenario.expect_availability_results.as_ref() {
        if *expected != availability_results {
            failures.push(format!(
                "expected availability results {expected:?}, got {availability_results:?}"
            ));
        }
    }
    if let Some(expected) = scenario.expect_install_results.as_ref() {
        if *expected != install_results {
            failures.push(format!(
                "expected install results {expected:?}, got {install_results:?}"
            ));
        }
    }

    Ok(ScenarioReport {
        scenario_name: scenario.name.clone(),
        step_count: scenario.steps.len(),
        steps,
        final_status,
        counters,
        availability_results,
        install_results,
        failures,
    })
}
