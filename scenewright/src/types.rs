// src/types.rs
//
// Common shared types for the scenewright session layer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Raw, loosely-typed action parameters as supplied by the client.
pub type RawParams = Map<String, JsonValue>;

/// Loosely-typed scene configuration as supplied by the client.
pub type SceneConfig = JsonValue;

/// 3-D vector in engine world coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Horizontal (XZ-plane) distance, ignoring height.
    pub fn distance_xz(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }

    /// Read `{x, y, z}` from engine metadata. Missing components are 0.
    pub fn from_json(value: &JsonValue) -> Option<Vec3> {
        let obj = value.as_object()?;
        let get = |k: &str| obj.get(k).and_then(JsonValue::as_f64).unwrap_or(0.0);
        Some(Vec3::new(get("x"), get("y"), get("z")))
    }
}

/// RGB segmentation colour of an object. Components are None when the
/// engine did not report a colour for the object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: Option<u8>,
    pub g: Option<u8>,
    pub b: Option<u8>,
}

/// Opaque raw image buffer (frame, depth, or mask) produced by the engine.
///
/// The session layer only moves these between lists; it never decodes them.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameBuffer(pub Vec<u8>);

impl FrameBuffer {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FrameBuffer({} bytes)", self.0.len())
    }
}
