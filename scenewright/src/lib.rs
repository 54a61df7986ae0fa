//! Scenewright core library.
//!
//! This crate sits between a research client and a step-based 3D simulation
//! engine. It accepts abstract action requests, validates them into bounded
//! engine payloads, and returns normalized, tier-filtered observation
//! snapshots while keeping a per-scene step history.
//!
//! # Architecture
//!
//! - **Session** (`session`): the NO_SCENE / ACTIVE state machine. Owns step
//!   counters, the habituation counter, the current goal and the history
//!   recorder. The only component talking to the engine and persistence.
//!
//! - **Goal** (`goal`): immutable per-scene task configuration and the
//!   per-step permitted-action lookup.
//!
//! - **Parameters** (`params`): pure validation of raw action parameters
//!   (defaults, clamping, coordinate conversion, optional noise).
//!
//! - **Tiers** (`tier`): redaction of observation and goal output by
//!   metadata tier.
//!
//! - **Reward** (`reward`): goal completion predicate per step.
//!
//! - **History** (`history`): one-open-record step log and its persistence
//!   interface (JSONL files, in-memory, null).
//!
//! - **Engine boundary** (`engine`): the `Engine` trait, step payloads, raw
//!   output, and a scripted recording engine for tests and dry runs.
//!
//! Configuration (`config`) is resolved once into an immutable
//! `SessionConfig`. Logging goes through `tracing`; the host installs the
//! subscriber.

pub mod action;
pub mod config;
pub mod engine;
pub mod goal;
pub mod history;
pub mod observation;
pub mod params;
pub mod reward;
pub mod session;
pub mod tier;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use action::{parse_command, Action, ActionCategory, ParsedCommand};
pub use config::{ConfigError, ConfigSource, FileConfig, SessionConfig, SessionConfigBuilder};
pub use engine::{
    Engine, EngineError, EngineFrame, EngineOutput, PayloadRecorder, RenderFlags, ScriptedEngine,
    StepPayload,
};
pub use goal::GoalDescriptor;
pub use history::{
    HistoryError, HistoryLine, HistoryRecorder, HistoryStore, HistoryTarget, JsonlHistoryStore,
    MemoryHistoryStore, NullHistoryStore, SceneHeader, ScoreTrailer, StepRecord, StoredScene,
};
pub use observation::{
    AgentSnapshot, CameraParams, Material, ObjectRecord, ObservationSnapshot, Pose, ReturnStatus,
};
pub use params::{
    AdjustmentKind, ParamAdjustment, ParameterValidator, TargetVector, ValidatedParameters,
    ValidationResult, ValidatorVariant,
};
pub use session::{
    Outcome, SessionController, SessionError, SessionState, SessionWarning, StepAnnotation,
    StepOutcome,
};
pub use tier::MetadataTier;
pub use types::{FrameBuffer, RawParams, Rgb, SceneConfig, Vec3};
