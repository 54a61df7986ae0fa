// src/engine/scripted.rs
//
// Deterministic in-process engine.
//
// Records every payload it receives and answers from a queue of scripted
// outputs, falling back to a fixed standing-agent frame. Used for tests,
// command-file dry runs and replay comparisons.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value as JsonValue};

use super::{Engine, EngineError, EngineFrame, EngineOutput, StepPayload};
use crate::types::FrameBuffer;

/// Thread-safe payload recorder shared with the caller.
#[derive(Debug, Clone, Default)]
pub struct PayloadRecorder {
    payloads: Arc<Mutex<Vec<StepPayload>>>,
}

impl PayloadRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, payload: StepPayload) {
        if let Ok(mut payloads) = self.payloads.lock() {
            payloads.push(payload);
        }
    }

    pub fn payloads(&self) -> Vec<StepPayload> {
        self.payloads.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Action names of every recorded payload, in order.
    pub fn actions(&self) -> Vec<String> {
        self.payloads()
            .iter()
            .filter_map(|p| p.action_name().map(str::to_string))
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut payloads) = self.payloads.lock() {
            payloads.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.payloads.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedEngine {
    recorder: PayloadRecorder,
    queue: VecDeque<Result<EngineOutput, String>>,
    frames_per_step: usize,
    calls: usize,
}

impl ScriptedEngine {
    pub fn new(recorder: PayloadRecorder) -> Self {
        Self {
            recorder,
            queue: VecDeque::new(),
            frames_per_step: 1,
            calls: 0,
        }
    }

    /// Number of sub-frames in each fallback output.
    pub fn with_frames_per_step(mut self, frames: usize) -> Self {
        self.frames_per_step = frames.max(1);
        self
    }

    /// Queue an output for the next unanswered call.
    pub fn push_output(&mut self, output: EngineOutput) {
        self.queue.push_back(Ok(output));
    }

    /// Queue a crash for the next unanswered call.
    pub fn push_crash(&mut self, reason: &str) {
        self.queue.push_back(Err(reason.to_string()));
    }

    pub fn recorder(&self) -> &PayloadRecorder {
        &self.recorder
    }

    /// Fallback output: standing agent at the origin, no objects.
    pub fn default_output(frames: usize, tag: u8) -> EngineOutput {
        EngineOutput::new(default_metadata(), solid_frames(frames, tag))
    }
}

impl Engine for ScriptedEngine {
    fn step(&mut self, payload: &StepPayload) -> Result<EngineOutput, EngineError> {
        self.recorder.record(payload.clone());
        self.calls += 1;
        match self.queue.pop_front() {
            Some(Ok(output)) => Ok(output),
            Some(Err(reason)) => Err(EngineError::Crashed(reason)),
            None => Ok(Self::default_output(
                self.frames_per_step,
                (self.calls % 256) as u8,
            )),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Metadata of a standing agent at the origin with no objects in view.
pub fn default_metadata() -> JsonValue {
    json!({
        "agent": {
            "position": {"x": 0.0, "y": 0.4625, "z": 0.0},
            "rotation": {"x": 0.0, "y": 0.0, "z": 0.0},
            "cameraHorizon": 0.0
        },
        "cameraPosition": {"x": 0.0, "y": 0.4625, "z": 0.0},
        "clippingPlaneFar": 15.0,
        "clippingPlaneNear": 0.0,
        "fov": 42.5,
        "lastActionStatus": "SUCCESSFUL",
        "objects": [],
        "pose": "STANDING",
        "structuralObjects": []
    })
}

/// Frames whose buffers are filled with `tag`, with depth and mask present.
pub fn solid_frames(count: usize, tag: u8) -> Vec<EngineFrame> {
    (0..count)
        .map(|_| EngineFrame {
            image: FrameBuffer(vec![tag; 4]),
            depth: Some(FrameBuffer(vec![tag; 2])),
            object_mask: Some(FrameBuffer(vec![tag; 3])),
            object_id_to_color: Default::default(),
        })
        .collect()
}
