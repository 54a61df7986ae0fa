// src/engine/mod.rs
//
// Engine boundary.
//
// The session layer talks to the simulation engine through the `Engine`
// trait: one flat payload out, one raw output (metadata mapping plus image
// buffers) back. Transport failures are the only hard errors at this seam.

pub mod scripted;

pub use scripted::{PayloadRecorder, ScriptedEngine};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use thiserror::Error;

use crate::params::{TargetVector, ValidatedParameters};
use crate::types::{FrameBuffer, SceneConfig};

/// Engine grid size sent with every step.
pub const GRID_SIZE: f64 = 0.1;

/// Maximum reach of the agent, in world units.
pub const MAX_REACH_DISTANCE: f64 = 1.0;

/// Name of the scene-initialization action.
pub const INITIALIZE_ACTION: &str = "Initialize";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine unreachable: {0}")]
    Unreachable(String),
    #[error("engine crashed: {0}")]
    Crashed(String),
    #[error("engine protocol error: {0}")]
    Protocol(String),
}

/// Rendering requests carried on every payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderFlags {
    pub depth: bool,
    pub object_mask: bool,
    pub consistent_colors: bool,
}

/// Flat key/value payload for one engine step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepPayload(Map<String, JsonValue>);

impl StepPayload {
    fn base(action: &str, render: &RenderFlags) -> Self {
        let mut map = Map::new();
        map.insert("action".into(), json!(action));
        map.insert("continuous".into(), json!(true));
        map.insert("gridSize".into(), json!(GRID_SIZE));
        map.insert("logs".into(), json!(true));
        map.insert("visibilityDistance".into(), json!(MAX_REACH_DISTANCE));
        map.insert("renderDepthImage".into(), json!(render.depth));
        map.insert("renderObjectImage".into(), json!(render.object_mask));
        map.insert("consistentColors".into(), json!(render.consistent_colors));
        Self(map)
    }

    /// Payload that loads a scene.
    pub fn initialize(scene: &SceneConfig, render: &RenderFlags) -> Self {
        let mut payload = Self::base(INITIALIZE_ACTION, render);
        payload.0.insert("sceneConfig".into(), scene.clone());
        payload
    }

    /// Payload for an action step. `engine_action` is the already-translated
    /// engine name.
    pub fn action(engine_action: &str, params: &ValidatedParameters, render: &RenderFlags) -> Self {
        let mut payload = Self::base(engine_action, render);
        let map = &mut payload.0;
        map.insert("moveMagnitude".into(), json!(params.move_magnitude));
        map.insert("rotation".into(), json!({ "y": params.rotation }));
        map.insert("horizon".into(), json!(params.horizon));
        map.insert("objectId".into(), json!(params.object_id));
        map.insert("receptacleObjectId".into(), json!(params.receptacle_object_id));
        insert_target(map, "object", &params.object_target);
        insert_target(map, "receptacleObject", &params.receptacle_target);
        payload
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    pub fn action_name(&self) -> Option<&str> {
        self.0.get("action").and_then(JsonValue::as_str)
    }

    pub fn as_map(&self) -> &Map<String, JsonValue> {
        &self.0
    }
}

fn insert_target(map: &mut Map<String, JsonValue>, prefix: &str, target: &TargetVector) {
    match target {
        TargetVector::ImageCoords { x, y } => {
            map.insert(format!("{prefix}ImageCoords"), json!({ "x": x, "y": y }));
        }
        TargetVector::Direction(v) => {
            map.insert(
                format!("{prefix}Direction"),
                json!({ "x": v.x, "y": v.y, "z": v.z }),
            );
        }
    }
}

/// One rendered sub-frame of an engine step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineFrame {
    pub image: FrameBuffer,
    pub depth: Option<FrameBuffer>,
    pub object_mask: Option<FrameBuffer>,
    /// Segmentation colour per object id.
    pub object_id_to_color: BTreeMap<String, [u8; 3]>,
}

/// Raw per-step engine output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutput {
    pub metadata: JsonValue,
    pub frames: Vec<EngineFrame>,
}

impl EngineOutput {
    pub fn new(metadata: JsonValue, frames: Vec<EngineFrame>) -> Self {
        Self { metadata, frames }
    }

    /// Colour map of the final frame (empty when there are no frames).
    pub fn object_colors(&self) -> Option<&BTreeMap<String, [u8; 3]>> {
        self.frames.last().map(|f| &f.object_id_to_color)
    }
}

/// A step-based simulation engine.
///
/// Calls are strictly sequential; each blocks until physics has settled.
pub trait Engine {
    fn step(&mut self, payload: &StepPayload) -> Result<EngineOutput, EngineError>;

    fn name(&self) -> &str {
        "engine"
    }
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn step(&mut self, payload: &StepPayload) -> Result<EngineOutput, EngineError> {
        (**self).step(payload)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
