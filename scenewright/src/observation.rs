// src/observation.rs
//
// Observation snapshots built from raw engine output.
//
// Extraction reads only documented metadata keys. Missing or ill-typed fields
// degrade to defaults; unrecognized pose and return-status strings fall back
// to UNDEFINED and are reported so the session can surface a warning.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::engine::EngineOutput;
use crate::goal::GoalDescriptor;
use crate::params::ValidatorVariant;
use crate::types::{FrameBuffer, Rgb, Vec3};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Pose {
    Standing,
    Crawling,
    Lying,
    #[default]
    Undefined,
}

impl Pose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pose::Standing => "STANDING",
            Pose::Crawling => "CRAWLING",
            Pose::Lying => "LYING",
            Pose::Undefined => "UNDEFINED",
        }
    }

    /// Exact engine name lookup. None for anything unrecognized.
    pub fn parse(s: &str) -> Option<Pose> {
        match s {
            "STANDING" => Some(Pose::Standing),
            "CRAWLING" => Some(Pose::Crawling),
            "LYING" => Some(Pose::Lying),
            "UNDEFINED" => Some(Pose::Undefined),
            _ => None,
        }
    }
}

/// Outcome of the last action as reported by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnStatus {
    Successful,
    CannotClose,
    CannotMove,
    CannotOpen,
    CannotPickup,
    CannotPull,
    CannotPush,
    CannotPut,
    CannotRotate,
    Failed,
    HandIsEmpty,
    HandIsFull,
    IsClosedCompletely,
    IsOpenedCompletely,
    NotInteractable,
    NotObject,
    NotOpenable,
    NotPickupable,
    NotReceptacle,
    NotVisible,
    Obstructed,
    OutOfReach,
    #[default]
    Undefined,
}

impl ReturnStatus {
    pub const ALL: [ReturnStatus; 23] = [
        ReturnStatus::Successful,
        ReturnStatus::CannotClose,
        ReturnStatus::CannotMove,
        ReturnStatus::CannotOpen,
        ReturnStatus::CannotPickup,
        ReturnStatus::CannotPull,
        ReturnStatus::CannotPush,
        ReturnStatus::CannotPut,
        ReturnStatus::CannotRotate,
        ReturnStatus::Failed,
        ReturnStatus::HandIsEmpty,
        ReturnStatus::HandIsFull,
        ReturnStatus::IsClosedCompletely,
        ReturnStatus::IsOpenedCompletely,
        ReturnStatus::NotInteractable,
        ReturnStatus::NotObject,
        ReturnStatus::NotOpenable,
        ReturnStatus::NotPickupable,
        ReturnStatus::NotReceptacle,
        ReturnStatus::NotVisible,
        ReturnStatus::Obstructed,
        ReturnStatus::OutOfReach,
        ReturnStatus::Undefined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnStatus::Successful => "SUCCESSFUL",
            ReturnStatus::CannotClose => "CANNOT_CLOSE",
            ReturnStatus::CannotMove => "CANNOT_MOVE",
            ReturnStatus::CannotOpen => "CANNOT_OPEN",
            ReturnStatus::CannotPickup => "CANNOT_PICKUP",
            ReturnStatus::CannotPull => "CANNOT_PULL",
            ReturnStatus::CannotPush => "CANNOT_PUSH",
            ReturnStatus::CannotPut => "CANNOT_PUT",
            ReturnStatus::CannotRotate => "CANNOT_ROTATE",
            ReturnStatus::Failed => "FAILED",
            ReturnStatus::HandIsEmpty => "HAND_IS_EMPTY",
            ReturnStatus::HandIsFull => "HAND_IS_FULL",
            ReturnStatus::IsClosedCompletely => "IS_CLOSED_COMPLETELY",
            ReturnStatus::IsOpenedCompletely => "IS_OPENED_COMPLETELY",
            ReturnStatus::NotInteractable => "NOT_INTERACTABLE",
            ReturnStatus::NotObject => "NOT_OBJECT",
            ReturnStatus::NotOpenable => "NOT_OPENABLE",
            ReturnStatus::NotPickupable => "NOT_PICKUPABLE",
            ReturnStatus::NotReceptacle => "NOT_RECEPTACLE",
            ReturnStatus::NotVisible => "NOT_VISIBLE",
            ReturnStatus::Obstructed => "OBSTRUCTED",
            ReturnStatus::OutOfReach => "OUT_OF_REACH",
            ReturnStatus::Undefined => "UNDEFINED",
        }
    }

    pub fn parse(s: &str) -> Option<ReturnStatus> {
        ReturnStatus::ALL.iter().copied().find(|r| r.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Material {
    Ceramic,
    Fabric,
    Food,
    Glass,
    Metal,
    Organic,
    Paper,
    Plastic,
    Rubber,
    Soap,
    Sponge,
    Stone,
    Undefined,
    Wax,
    Wood,
}

impl Material {
    /// Case-insensitive lookup.
    pub fn parse(s: &str) -> Option<Material> {
        let material = match s.to_ascii_uppercase().as_str() {
            "CERAMIC" => Material::Ceramic,
            "FABRIC" => Material::Fabric,
            "FOOD" => Material::Food,
            "GLASS" => Material::Glass,
            "METAL" => Material::Metal,
            "ORGANIC" => Material::Organic,
            "PAPER" => Material::Paper,
            "PLASTIC" => Material::Plastic,
            "RUBBER" => Material::Rubber,
            "SOAP" => Material::Soap,
            "SPONGE" => Material::Sponge,
            "STONE" => Material::Stone,
            "UNDEFINED" => Material::Undefined,
            "WAX" => Material::Wax,
            "WOOD" => Material::Wood,
            _ => return None,
        };
        Some(material)
    }
}

/// One interactive or structural object as seen by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub uuid: String,
    pub color: Rgb,
    /// Bounding-box corners, when the engine reports them.
    pub dimensions: Option<Vec<Vec3>>,
    pub direction: Option<Vec3>,
    /// Horizontal distance in agent move steps.
    pub distance_in_steps: f64,
    pub distance_in_world: f64,
    pub held: bool,
    pub mass: f64,
    pub material_list: Vec<Material>,
    pub position: Option<Vec3>,
    pub rotation: Option<Vec3>,
    pub shape: String,
    pub texture_color_list: Vec<String>,
    /// In camera view or held by the agent.
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraParams {
    pub aspect_ratio: (u32, u32),
    pub clipping_planes: (f64, f64),
    pub field_of_view: f64,
    pub height: f64,
}

/// Agent state used by reward evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub position: Option<Vec3>,
    pub rotation: Option<f64>,
    pub head_tilt: f64,
}

/// Unsupported enumerated engine values found during extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionIssue {
    UnsupportedPose(String),
    UnsupportedReturnStatus(String),
}

/// Everything read from one engine output before tier filtering.
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    pub agent: AgentSnapshot,
    pub camera: CameraParams,
    pub pose: Pose,
    pub return_status: ReturnStatus,
    /// Sorted by uuid.
    pub objects: Vec<ObjectRecord>,
    /// Sorted by uuid.
    pub structural_objects: Vec<ObjectRecord>,
    pub issues: Vec<ExtractionIssue>,
}

/// Per-step result handed to the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationSnapshot {
    /// Actions permitted for the next step.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_list: Vec<String>,
    pub camera: CameraParams,
    pub goal: GoalDescriptor,
    pub habituation_trial: Option<u32>,
    pub head_tilt: f64,
    #[serde(skip)]
    pub image_list: Vec<FrameBuffer>,
    #[serde(skip)]
    pub depth_mask_list: Vec<FrameBuffer>,
    #[serde(skip)]
    pub object_mask_list: Vec<FrameBuffer>,
    pub object_list: Vec<ObjectRecord>,
    pub structural_object_list: Vec<ObjectRecord>,
    pub pose: Pose,
    pub position: Option<Vec3>,
    pub rotation: Option<f64>,
    pub return_status: ReturnStatus,
    pub reward: i32,
    pub step_number: u32,
}

impl ObservationSnapshot {
    /// Copy without image buffers or the next-step action list, for history.
    pub fn stripped(&self) -> ObservationSnapshot {
        ObservationSnapshot {
            action_list: Vec::new(),
            image_list: Vec::new(),
            depth_mask_list: Vec::new(),
            object_mask_list: Vec::new(),
            ..self.clone()
        }
    }

    /// Append the buffers of `frames` to this snapshot's image lists.
    pub fn append_frames(&mut self, output: &EngineOutput) {
        for frame in &output.frames {
            self.image_list.push(frame.image.clone());
            if let Some(depth) = &frame.depth {
                self.depth_mask_list.push(depth.clone());
            }
            if let Some(mask) = &frame.object_mask {
                self.object_mask_list.push(mask.clone());
            }
        }
    }

    /// Move the image lists of `earlier` in front of this snapshot's lists.
    pub fn prepend_frames(&mut self, earlier: ObservationSnapshot) {
        let mut images = earlier.image_list;
        images.append(&mut self.image_list);
        self.image_list = images;

        let mut depth = earlier.depth_mask_list;
        depth.append(&mut self.depth_mask_list);
        self.depth_mask_list = depth;

        let mut masks = earlier.object_mask_list;
        masks.append(&mut self.object_mask_list);
        self.object_mask_list = masks;
    }
}

/// Read agent, camera, and object state from raw engine output.
pub fn extract(
    output: &EngineOutput,
    variant: ValidatorVariant,
    screen: (u32, u32),
) -> Extracted {
    let meta = &output.metadata;
    let empty = BTreeMap::new();
    let colors = output.object_colors().unwrap_or(&empty);
    let mut issues = Vec::new();

    let agent_meta = meta.get("agent");
    let agent = AgentSnapshot {
        position: agent_meta.and_then(|a| a.get("position")).and_then(Vec3::from_json),
        rotation: agent_meta
            .and_then(|a| a.get("rotation"))
            .and_then(|r| r.get("y"))
            .and_then(JsonValue::as_f64),
        head_tilt: agent_meta
            .and_then(|a| a.get("cameraHorizon"))
            .and_then(JsonValue::as_f64)
            .unwrap_or(0.0),
    };

    let camera = CameraParams {
        aspect_ratio: screen,
        clipping_planes: (
            f64_at(meta, "clippingPlaneNear"),
            f64_at(meta, "clippingPlaneFar"),
        ),
        field_of_view: f64_at(meta, "fov"),
        height: meta
            .get("cameraPosition")
            .and_then(|c| c.get("y"))
            .and_then(JsonValue::as_f64)
            .unwrap_or(0.0),
    };

    let pose = match meta.get("pose").and_then(JsonValue::as_str) {
        None => Pose::Undefined,
        Some(raw) => Pose::parse(raw).unwrap_or_else(|| {
            issues.push(ExtractionIssue::UnsupportedPose(raw.to_string()));
            Pose::Undefined
        }),
    };

    let return_status = match meta.get("lastActionStatus").and_then(JsonValue::as_str) {
        None | Some("") => ReturnStatus::Undefined,
        Some(raw) => ReturnStatus::parse(raw).unwrap_or_else(|| {
            issues.push(ExtractionIssue::UnsupportedReturnStatus(raw.to_string()));
            ReturnStatus::Undefined
        }),
    };

    let move_distance = variant.move_distance();
    Extracted {
        agent,
        camera,
        pose,
        return_status,
        objects: object_records(meta.get("objects"), colors, move_distance),
        structural_objects: object_records(meta.get("structuralObjects"), colors, move_distance),
        issues,
    }
}

fn f64_at(meta: &JsonValue, key: &str) -> f64 {
    meta.get(key).and_then(JsonValue::as_f64).unwrap_or(0.0)
}

fn object_records(
    list: Option<&JsonValue>,
    colors: &BTreeMap<String, [u8; 3]>,
    move_distance: f64,
) -> Vec<ObjectRecord> {
    let mut records: Vec<ObjectRecord> = list
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| item.is_object())
                .map(|item| object_record(item, colors, move_distance))
                .collect()
        })
        .unwrap_or_default();
    records.sort_by(|a, b| a.uuid.cmp(&b.uuid));
    records
}

fn object_record(
    meta: &JsonValue,
    colors: &BTreeMap<String, [u8; 3]>,
    move_distance: f64,
) -> ObjectRecord {
    let uuid = meta
        .get("objectId")
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string();
    let color = colors
        .get(&uuid)
        .map(|[r, g, b]| Rgb {
            r: Some(*r),
            g: Some(*g),
            b: Some(*b),
        })
        .unwrap_or_default();
    let dimensions = meta
        .get("objectBounds")
        .and_then(|b| b.get("objectBoundsCorners"))
        .and_then(JsonValue::as_array)
        .map(|corners| corners.iter().filter_map(Vec3::from_json).collect());
    let material_list = meta
        .get("salientMaterials")
        .and_then(JsonValue::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(JsonValue::as_str)
                .filter_map(Material::parse)
                .collect()
        })
        .unwrap_or_default();
    let texture_color_list = meta
        .get("colorsFromMaterials")
        .and_then(JsonValue::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let held = bool_at(meta, "isPickedUp");

    ObjectRecord {
        uuid,
        color,
        dimensions,
        direction: meta.get("direction").and_then(Vec3::from_json),
        distance_in_steps: f64_at(meta, "distanceXZ") / move_distance,
        distance_in_world: f64_at(meta, "distance"),
        held,
        mass: f64_at(meta, "mass"),
        material_list,
        position: meta.get("position").and_then(Vec3::from_json),
        rotation: meta.get("rotation").and_then(Vec3::from_json),
        shape: meta
            .get("shape")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string(),
        texture_color_list,
        visible: bool_at(meta, "visibleInCamera") || held,
    }
}

fn bool_at(meta: &JsonValue, key: &str) -> bool {
    meta.get(key).and_then(JsonValue::as_bool).unwrap_or(false)
}
