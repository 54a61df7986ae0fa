// src/session.rs
//
// Session protocol state machine.
//
//   NO_SCENE --start_scene--> ACTIVE --end_scene--> NO_SCENE
//
// Within ACTIVE the controller owns the scene-step index, the caller-visible
// step number, the habituation counter, the goal and the history recorder.
// Recoverable problems (bad parameters, disallowed actions, exhausted budget,
// unsupported engine enum values, persistence failures) never fail a call:
// each is logged once with `warn!` and returned as a SessionWarning. Only
// engine transport failures are errors.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::action::{parse_command, Action};
use crate::config::SessionConfig;
use crate::engine::{Engine, EngineError, EngineOutput, StepPayload};
use crate::goal::GoalDescriptor;
use crate::history::{
    HistoryError, HistoryRecorder, HistoryStore, JsonlHistoryStore, NullHistoryStore, SceneHeader,
    StepRecord,
};
use crate::observation::{self, ExtractionIssue, ObservationSnapshot};
use crate::params::{AdjustmentKind, ParameterValidator, ValidatedParameters};
use crate::reward;
use crate::tier::strip_goal_images;
use crate::types::{RawParams, SceneConfig};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Recoverable condition surfaced to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionWarning {
    /// step / end_scene / annotation called with no active scene.
    NoActiveScene { operation: &'static str },
    /// start_scene called while a scene was active; it was ended first.
    SceneReplaced { previous: String },
    UnknownAction { action: String },
    ActionNotPermitted {
        action: String,
        permitted: Vec<String>,
    },
    StepBudgetExhausted { last_step: u32 },
    /// The accepted step used the last step of the budget.
    FinalStep { last_step: u32 },
    ParameterAdjusted { name: String, kind: AdjustmentKind },
    MalformedCommandToken { token: String },
    UnsupportedPose(String),
    UnsupportedReturnStatus(String),
    /// Annotation with no step taken yet in this scene.
    NoStepToAnnotate,
    /// Persistence failed; history for the rest of the scene is dropped.
    HistoryDisabled { reason: String },
    /// An annotation artifact could not be stored; step history is kept.
    ArtifactNotStored { name: String, reason: String },
}

impl fmt::Display for SessionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionWarning::NoActiveScene { operation } => {
                write!(f, "{operation} called with no active scene")
            }
            SessionWarning::SceneReplaced { previous } => {
                write!(f, "scene {previous:?} was still active; ended without a choice")
            }
            SessionWarning::UnknownAction { action } => {
                write!(f, "unknown action {action:?}")
            }
            SessionWarning::ActionNotPermitted { action, permitted } => write!(
                f,
                "action {action:?} is not permitted this step; permitted: {}",
                permitted.join(", ")
            ),
            SessionWarning::StepBudgetExhausted { last_step } => write!(
                f,
                "step budget of {last_step} exhausted; call end_scene"
            ),
            SessionWarning::FinalStep { last_step } => {
                write!(f, "this was the last step ({last_step}) of the scene")
            }
            SessionWarning::ParameterAdjusted { name, kind } => match kind {
                AdjustmentKind::Malformed => {
                    write!(f, "parameter {name} is not a finite number; using default")
                }
                AdjustmentKind::Clamped => write!(f, "parameter {name} out of range; clamped"),
            },
            SessionWarning::MalformedCommandToken { token } => {
                write!(f, "ignoring malformed command token {token:?}")
            }
            SessionWarning::UnsupportedPose(pose) => {
                write!(f, "pose {pose:?} is not supported; using UNDEFINED")
            }
            SessionWarning::UnsupportedReturnStatus(status) => {
                write!(f, "return status {status:?} is not supported; using UNDEFINED")
            }
            SessionWarning::NoStepToAnnotate => write!(f, "no step to annotate yet"),
            SessionWarning::HistoryDisabled { reason } => {
                write!(f, "history disabled for this scene: {reason}")
            }
            SessionWarning::ArtifactNotStored { name, reason } => {
                write!(f, "artifact {name:?} not stored: {reason}")
            }
        }
    }
}

/// Result value plus the warnings raised while producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<SessionWarning>,
}

impl<T> Outcome<T> {
    fn new(value: T, warnings: Vec<SessionWarning>) -> Self {
        Self { value, warnings }
    }
}

/// Result of `step`: None when the request was rejected.
pub type StepOutcome = Outcome<Option<ObservationSnapshot>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoScene,
    Active,
}

/// Client annotation of the most recent step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepAnnotation {
    pub choice: Option<String>,
    pub confidence: Option<f64>,
    pub violations_xy_list: Option<Vec<JsonValue>>,
    /// Encoded heatmap image; stored as an opaque artifact.
    pub heatmap_img: Option<Vec<u8>>,
    pub internal_state: Option<JsonValue>,
}

struct ActiveScene {
    name: String,
    goal: GoalDescriptor,
    /// Every engine step since Initialize, including auto-run preview steps.
    scene_step: u32,
    /// Step number shown to the caller.
    step_number: u32,
    habituation_trial: u32,
    history: HistoryRecorder,
}

/// Output of one engine action before history bookkeeping.
struct Executed {
    engine_action: String,
    params: ValidatedParameters,
    snapshot: ObservationSnapshot,
}

pub struct SessionController<E: Engine> {
    engine: E,
    config: SessionConfig,
    store: Box<dyn HistoryStore>,
    validator: ParameterValidator,
    rng: ChaCha8Rng,
    scene: Option<ActiveScene>,
}

impl<E: Engine> SessionController<E> {
    /// Controller persisting history under `config.history_dir` (or nowhere
    /// when history is disabled).
    pub fn new(engine: E, config: SessionConfig) -> Self {
        let store: Box<dyn HistoryStore> = if config.history_enabled {
            Box::new(JsonlHistoryStore::new(config.history_dir.clone()))
        } else {
            Box::new(NullHistoryStore)
        };
        Self::with_store(engine, config, store)
    }

    pub fn with_store(engine: E, config: SessionConfig, store: Box<dyn HistoryStore>) -> Self {
        let validator = ParameterValidator::new(config.validator, config.screen_height());
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        config.log_startup();
        Self {
            engine,
            config,
            store,
            validator,
            rng,
            scene: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    pub fn state(&self) -> SessionState {
        if self.scene.is_some() {
            SessionState::Active
        } else {
            SessionState::NoScene
        }
    }

    /// Caller-visible step number of the active scene.
    pub fn step_number(&self) -> Option<u32> {
        self.scene.as_ref().map(|s| s.step_number)
    }

    /// Scene-step index, counting auto-run preview steps.
    pub fn scene_step(&self) -> Option<u32> {
        self.scene.as_ref().map(|s| s.scene_step)
    }

    pub fn habituation_trial(&self) -> Option<u32> {
        self.scene.as_ref().map(|s| s.habituation_trial)
    }

    pub fn goal(&self) -> Option<&GoalDescriptor> {
        self.scene.as_ref().map(|s| &s.goal)
    }

    /// Actions the active scene accepts for the next step.
    pub fn permitted_actions(&self) -> Option<Vec<String>> {
        self.scene
            .as_ref()
            .map(|s| s.goal.permitted_actions(s.scene_step))
    }

    /// Load a scene and return its first snapshot.
    ///
    /// Unless the goal asks to skip it, the preview phase is run here with the
    /// no-op action; its frames are appended to the returned snapshot, which
    /// still reports step number 0.
    pub fn start_scene(
        &mut self,
        scene_config: &SceneConfig,
    ) -> Result<Outcome<ObservationSnapshot>, SessionError> {
        let mut warnings = Vec::new();

        if let Some(previous) = self.scene.as_ref().map(|s| s.name.clone()) {
            emit(
                &mut warnings,
                &previous,
                SessionWarning::SceneReplaced { previous: previous.clone() },
            );
            warnings.extend(self.end_scene(None, 1.0).warnings);
        }

        let name = scene_name(scene_config);
        let goal = GoalDescriptor::from_scene_config(scene_config);
        // History is opened only once the engine has accepted the scene.
        let mut scene = ActiveScene {
            name,
            goal,
            scene_step: 0,
            step_number: 0,
            habituation_trial: 1,
            history: HistoryRecorder::disabled(),
        };

        info!(
            scene = %scene.name,
            tier = self.config.metadata_tier.as_str(),
            preview_steps = scene.goal.last_preview_phase_step,
            last_step = ?scene.goal.last_step,
            "starting scene"
        );

        let render = self.config.render_flags();
        let output = self
            .engine
            .step(&StepPayload::initialize(scene_config, &render))?;
        let mut snapshot = self.build_snapshot(&scene, &output, &mut warnings);

        if !scene.goal.skip_preview_phase {
            for _ in 0..scene.goal.last_preview_phase_step {
                scene.scene_step += 1;
                let executed = self.execute(&scene, Action::NOOP.as_str(), &RawParams::new(), &mut warnings)?;
                let mut next = executed.snapshot;
                next.prepend_frames(snapshot);
                snapshot = next;
            }
        }
        scene.history = self.open_history(scene_config, &scene.name, &mut warnings);

        debug!(
            scene = %scene.name,
            frames = snapshot.image_list.len(),
            scene_step = scene.scene_step,
            "scene ready"
        );
        self.scene = Some(scene);
        Ok(Outcome::new(snapshot, warnings))
    }

    /// Take one step. Returns no snapshot when the request is rejected.
    pub fn step(&mut self, action: &str, params: RawParams) -> Result<StepOutcome, SessionError> {
        let mut warnings = Vec::new();
        let Some(mut scene) = self.scene.take() else {
            emit(
                &mut warnings,
                "",
                SessionWarning::NoActiveScene { operation: "step" },
            );
            return Ok(Outcome::new(None, warnings));
        };
        let result = self.step_in_scene(&mut scene, action, params, &mut warnings);
        self.scene = Some(scene);
        result.map(|snapshot| Outcome::new(snapshot, warnings))
    }

    /// Parse a `"Action, key=value, ..."` command line and take the step.
    pub fn step_command(&mut self, line: &str) -> Result<StepOutcome, SessionError> {
        let command = parse_command(line);
        let scene = self.scene.as_ref().map(|s| s.name.clone()).unwrap_or_default();
        let mut warnings = Vec::new();
        for token in command.rejected_tokens {
            emit(
                &mut warnings,
                &scene,
                SessionWarning::MalformedCommandToken { token },
            );
        }
        let mut outcome = self.step(&command.action, command.params)?;
        warnings.append(&mut outcome.warnings);
        outcome.warnings = warnings;
        Ok(outcome)
    }

    /// Attach the client's annotation to the most recent step. Must be called
    /// before the next step, which persists that step's record.
    pub fn make_step_prediction(&mut self, annotation: StepAnnotation) -> Outcome<()> {
        let mut warnings = Vec::new();
        let team_prefix = self.team_prefix();
        let Some(scene) = self.scene.as_mut() else {
            emit(
                &mut warnings,
                "",
                SessionWarning::NoActiveScene {
                    operation: "make_step_prediction",
                },
            );
            return Outcome::new((), warnings);
        };

        let StepAnnotation {
            choice,
            confidence,
            violations_xy_list,
            heatmap_img,
            internal_state,
        } = annotation;

        match scene.history.open_record_mut() {
            Some(record) => {
                if choice.is_some() {
                    record.classification = choice;
                }
                if confidence.is_some() {
                    record.confidence = confidence;
                }
                if violations_xy_list.is_some() {
                    record.violations_xy_list = violations_xy_list;
                }
                if internal_state.is_some() {
                    record.internal_state = internal_state;
                }
            }
            None => {
                emit(&mut warnings, &scene.name, SessionWarning::NoStepToAnnotate);
                return Outcome::new((), warnings);
            }
        }

        if let Some(bytes) = heatmap_img {
            let artifact = format!(
                "{}heatmap_{}_{}",
                team_prefix,
                scene.name.replace('/', "_"),
                scene.step_number
            );
            if let Err(err) = scene.history.put_artifact(&artifact, &bytes) {
                emit(
                    &mut warnings,
                    &scene.name,
                    SessionWarning::ArtifactNotStored {
                        name: artifact,
                        reason: err.to_string(),
                    },
                );
            }
        }
        Outcome::new((), warnings)
    }

    /// Persist the last step record and the final choice, and leave the scene.
    pub fn end_scene(&mut self, choice: Option<&str>, confidence: f64) -> Outcome<()> {
        let mut warnings = Vec::new();
        let Some(mut scene) = self.scene.take() else {
            emit(
                &mut warnings,
                "",
                SessionWarning::NoActiveScene {
                    operation: "end_scene",
                },
            );
            return Outcome::new((), warnings);
        };

        if let Err(err) = scene.history.finalize(choice, confidence) {
            disable_history(&mut scene, err, &mut warnings);
        }
        info!(
            scene = %scene.name,
            steps = scene.step_number,
            choice = ?choice,
            confidence,
            "scene ended"
        );
        Outcome::new((), warnings)
    }

    fn step_in_scene(
        &mut self,
        scene: &mut ActiveScene,
        action: &str,
        params: RawParams,
        warnings: &mut Vec<SessionWarning>,
    ) -> Result<Option<ObservationSnapshot>, SessionError> {
        if let Some(last_step) = scene.goal.last_step {
            if scene.goal.budget_exhausted(scene.scene_step) {
                emit(
                    warnings,
                    &scene.name,
                    SessionWarning::StepBudgetExhausted { last_step },
                );
                return Ok(None);
            }
        }

        let permitted = scene.goal.permitted_actions(scene.scene_step);
        if !permitted.iter().any(|a| a == action) {
            let warning = if Action::parse(action).is_none() {
                SessionWarning::UnknownAction {
                    action: action.to_string(),
                }
            } else {
                SessionWarning::ActionNotPermitted {
                    action: action.to_string(),
                    permitted,
                }
            };
            emit(warnings, &scene.name, warning);
            return Ok(None);
        }

        scene.scene_step += 1;
        scene.step_number += 1;
        if Action::parse(action).is_some_and(|a| a.is_habituation_boundary()) {
            scene.habituation_trial += 1;
        }

        let executed = match self.execute(scene, action, &params, warnings) {
            Ok(executed) => executed,
            Err(err) => {
                // Leave the counters as they were before the failed step.
                scene.scene_step -= 1;
                scene.step_number -= 1;
                if Action::parse(action).is_some_and(|a| a.is_habituation_boundary()) {
                    scene.habituation_trial -= 1;
                }
                return Err(err);
            }
        };

        // Persist the previous step now that its annotations are final.
        if scene.history.has_open_record() {
            if let Err(err) = scene.history.close_and_persist() {
                disable_history(scene, err, warnings);
            }
        }
        let mut output = executed.snapshot.stripped();
        strip_goal_images(&mut output.goal.metadata);
        let record = StepRecord {
            step: scene.step_number,
            action: executed.engine_action,
            args: params,
            params: executed.params,
            output,
            classification: None,
            confidence: None,
            violations_xy_list: None,
            internal_state: None,
        };
        if let Err(err) = scene.history.open_record(record) {
            disable_history(scene, err, warnings);
        }

        if let Some(last_step) = scene.goal.last_step {
            if scene.scene_step == last_step {
                emit(
                    warnings,
                    &scene.name,
                    SessionWarning::FinalStep { last_step },
                );
            }
        }

        Ok(Some(executed.snapshot))
    }

    /// Validate, send to the engine and build the snapshot. The caller has
    /// already advanced the scene counters.
    fn execute(
        &mut self,
        scene: &ActiveScene,
        action: &str,
        raw: &RawParams,
        warnings: &mut Vec<SessionWarning>,
    ) -> Result<Executed, SessionError> {
        let noise = if self.config.noise {
            Some(&mut self.rng)
        } else {
            None
        };
        let validated = self.validator.validate(action, raw, noise);
        for adjustment in validated.adjustments {
            emit(
                warnings,
                &scene.name,
                SessionWarning::ParameterAdjusted {
                    name: adjustment.name,
                    kind: adjustment.kind,
                },
            );
        }

        let engine_action = Action::parse(action)
            .map(|a| a.engine_name().to_string())
            .unwrap_or_else(|| action.to_string());
        let payload =
            StepPayload::action(&engine_action, &validated.params, &self.config.render_flags());
        let output = self.engine.step(&payload)?;
        let snapshot = self.build_snapshot(scene, &output, warnings);

        debug!(
            scene = %scene.name,
            step = scene.step_number,
            scene_step = scene.scene_step,
            action = %engine_action,
            habituation_trial = scene.habituation_trial,
            return_status = snapshot.return_status.as_str(),
            objects = snapshot.object_list.len(),
            reward = snapshot.reward,
            "step complete"
        );

        Ok(Executed {
            engine_action,
            params: validated.params,
            snapshot,
        })
    }

    fn build_snapshot(
        &self,
        scene: &ActiveScene,
        output: &EngineOutput,
        warnings: &mut Vec<SessionWarning>,
    ) -> ObservationSnapshot {
        let screen = (self.config.screen_width, self.config.screen_height());
        let extracted = observation::extract(output, self.config.validator, screen);
        for issue in &extracted.issues {
            let warning = match issue {
                ExtractionIssue::UnsupportedPose(p) => SessionWarning::UnsupportedPose(p.clone()),
                ExtractionIssue::UnsupportedReturnStatus(s) => {
                    SessionWarning::UnsupportedReturnStatus(s.clone())
                }
            };
            emit(warnings, &scene.name, warning);
        }

        let reward = reward::calculate(&scene.goal, &extracted.objects, &extracted.agent);
        let habituation_trial = (scene.habituation_trial <= scene.goal.habituation_total)
            .then_some(scene.habituation_trial);

        let mut snapshot = ObservationSnapshot {
            action_list: scene.goal.permitted_actions(scene.scene_step),
            camera: extracted.camera,
            goal: scene.goal.clone(),
            habituation_trial,
            head_tilt: extracted.agent.head_tilt,
            object_list: extracted.objects,
            structural_object_list: extracted.structural_objects,
            pose: extracted.pose,
            position: extracted.agent.position,
            rotation: extracted.agent.rotation,
            return_status: extracted.return_status,
            reward,
            step_number: scene.step_number,
            ..Default::default()
        };
        snapshot.append_frames(output);
        self.config.metadata_tier.filter_snapshot(&mut snapshot);
        snapshot
    }

    fn open_history(
        &mut self,
        scene_config: &SceneConfig,
        name: &str,
        warnings: &mut Vec<SessionWarning>,
    ) -> HistoryRecorder {
        let screenshot = scene_config
            .get("screenshot")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);
        if !self.config.history_enabled || screenshot {
            return HistoryRecorder::disabled();
        }
        let header = SceneHeader {
            name: name.to_string(),
            timestamp: unix_seconds(),
            team: self.config.team.clone(),
            metadata_tier: self.config.metadata_tier,
        };
        match self.store.open_target(&header) {
            Ok(target) => HistoryRecorder::new(target),
            Err(err) => {
                emit(
                    warnings,
                    name,
                    SessionWarning::HistoryDisabled {
                        reason: err.to_string(),
                    },
                );
                HistoryRecorder::disabled()
            }
        }
    }

    fn team_prefix(&self) -> String {
        if self.config.team.is_empty() {
            String::new()
        } else {
            format!("{}_", self.config.team)
        }
    }
}

impl<E: Engine> fmt::Debug for SessionController<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("engine", &self.engine.name())
            .field("state", &self.state())
            .field("step_number", &self.step_number())
            .finish()
    }
}

fn emit(warnings: &mut Vec<SessionWarning>, scene: &str, warning: SessionWarning) {
    warn!(scene, "{}", warning);
    warnings.push(warning);
}

fn disable_history(scene: &mut ActiveScene, err: HistoryError, warnings: &mut Vec<SessionWarning>) {
    scene.history.disable();
    let name = scene.name.clone();
    emit(
        warnings,
        &name,
        SessionWarning::HistoryDisabled {
            reason: err.to_string(),
        },
    );
}

/// Scene name without a trailing `.json`.
fn scene_name(scene_config: &SceneConfig) -> String {
    let name = scene_config
        .get("name")
        .and_then(JsonValue::as_str)
        .unwrap_or_default();
    name.strip_suffix(".json").unwrap_or(name).to_string()
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{PayloadRecorder, ScriptedEngine};
    use crate::history::MemoryHistoryStore;
    use serde_json::json;

    fn controller(store: MemoryHistoryStore) -> (SessionController<ScriptedEngine>, PayloadRecorder) {
        let recorder = PayloadRecorder::new();
        let engine = ScriptedEngine::new(recorder.clone());
        let config = SessionConfig::builder()
            .seed(1)
            .build_with_env(|_| None)
            .unwrap();
        (
            SessionController::with_store(engine, config, Box::new(store)),
            recorder,
        )
    }

    #[test]
    fn scene_name_strips_json_suffix() {
        assert_eq!(scene_name(&json!({"name": "a/b.json"})), "a/b");
        assert_eq!(scene_name(&json!({"name": "plain"})), "plain");
        assert_eq!(scene_name(&json!({})), "");
    }

    #[test]
    fn step_without_scene_warns() {
        let (mut ctl, recorder) = controller(MemoryHistoryStore::new());
        let out = ctl.step("MoveAhead", RawParams::new()).unwrap();
        assert!(out.value.is_none());
        assert_eq!(
            out.warnings,
            vec![SessionWarning::NoActiveScene { operation: "step" }]
        );
        assert!(recorder.is_empty());

        let end = ctl.end_scene(None, 1.0);
        assert_eq!(end.warnings.len(), 1);
    }

    #[test]
    fn engine_failure_leaves_counters_untouched() {
        let (mut ctl, _) = controller(MemoryHistoryStore::new());
        ctl.start_scene(&json!({"name": "s"})).unwrap();
        ctl.engine_mut().push_crash("lost connection");
        let err = ctl.step("MoveAhead", RawParams::new()).unwrap_err();
        assert!(matches!(err, SessionError::Engine(EngineError::Crashed(_))));
        assert_eq!(ctl.step_number(), Some(0));
        assert_eq!(ctl.state(), SessionState::Active);
    }

    #[test]
    fn failed_initialize_opens_no_history() {
        let store = MemoryHistoryStore::new();
        let (mut ctl, _) = controller(store.clone());
        ctl.engine_mut().push_crash("engine gone");
        assert!(ctl.start_scene(&json!({"name": "s"})).is_err());
        assert_eq!(ctl.state(), SessionState::NoScene);
        assert_eq!(store.scene_count(), 0);
    }

    #[test]
    fn failed_preview_step_opens_no_history() {
        let store = MemoryHistoryStore::new();
        let (mut ctl, recorder) = controller(store.clone());
        ctl.engine_mut()
            .push_output(ScriptedEngine::default_output(1, 1));
        ctl.engine_mut().push_crash("engine gone");
        let scene = json!({"name": "s", "goal": {"last_preview_phase_step": 2}});
        assert!(ctl.start_scene(&scene).is_err());
        assert_eq!(recorder.actions(), vec!["Initialize", "Pass"]);
        assert_eq!(store.scene_count(), 0);

        ctl.start_scene(&scene).unwrap();
        let scenes = store.scenes();
        assert_eq!(scenes.len(), 1);
        assert_eq!(
            scenes[0].header.as_ref().map(|h| h.metadata_tier),
            Some(crate::tier::MetadataTier::Default)
        );
    }

    #[test]
    fn unknown_action_is_distinguished() {
        let (mut ctl, _) = controller(MemoryHistoryStore::new());
        ctl.start_scene(&json!({"name": "s"})).unwrap();
        let out = ctl.step("Fly", RawParams::new()).unwrap();
        assert!(out.value.is_none());
        assert_eq!(
            out.warnings,
            vec![SessionWarning::UnknownAction {
                action: "Fly".into()
            }]
        );
    }

    #[test]
    fn habituation_counter_advances_on_boundary() {
        let (mut ctl, recorder) = controller(MemoryHistoryStore::new());
        let start = ctl
            .start_scene(&json!({"name": "s", "goal": {"habituation_total": 2}}))
            .unwrap();
        assert_eq!(start.value.habituation_trial, Some(1));

        let snap = ctl.step("EndHabituation", RawParams::new()).unwrap().value.unwrap();
        assert_eq!(snap.habituation_trial, Some(2));
        let snap = ctl.step("EndHabituation", RawParams::new()).unwrap().value.unwrap();
        assert_eq!(snap.habituation_trial, None);
        assert_eq!(ctl.habituation_trial(), Some(3));
        assert_eq!(
            recorder.actions(),
            vec!["Initialize", "EndHabituation", "EndHabituation"]
        );
    }

    #[test]
    fn engine_synonyms_are_sent() {
        let (mut ctl, recorder) = controller(MemoryHistoryStore::new());
        ctl.start_scene(&json!({"name": "s"})).unwrap();
        ctl.step("OpenObject", RawParams::new()).unwrap();
        ctl.step("DropObject", RawParams::new()).unwrap();
        assert_eq!(
            recorder.actions(),
            vec!["Initialize", "MCSOpenObject", "DropHandObject"]
        );
    }
}
