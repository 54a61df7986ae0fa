// src/tier.rs
//
// Metadata tier filtering.
//
// Tiers are ordered from most to least restrictive:
//   Level1 < Level2 < Default < Oracle
// Filtering only ever clears or drops fields, so applying it twice yields the
// same snapshot as applying it once.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::engine::RenderFlags;
use crate::goal::GoalDescriptor;
use crate::observation::ObservationSnapshot;

/// Goal metadata keys whose `image` entry reveals the task target.
pub const TARGET_KEYS: [&str; 3] = ["target", "target_1", "target_2"];

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MetadataTier {
    /// No masks, no agent position/rotation, no object lists, no target images.
    Level1,
    /// As Level1, but object masks are kept.
    Level2,
    /// Undeclared tier: only visible or held objects are listed.
    #[default]
    Default,
    /// Nothing hidden; segmentation colours are stable across steps.
    Oracle,
}

impl MetadataTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataTier::Level1 => "level1",
            MetadataTier::Level2 => "level2",
            MetadataTier::Default => "default",
            MetadataTier::Oracle => "oracle",
        }
    }

    /// Case-insensitive. Empty means Default.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" | "none" => Some(MetadataTier::Default),
            "level1" | "level_1" => Some(MetadataTier::Level1),
            "level2" | "level_2" => Some(MetadataTier::Level2),
            "oracle" => Some(MetadataTier::Oracle),
            _ => None,
        }
    }

    /// Rendering requests implied by the tier.
    pub fn render_flags(&self) -> RenderFlags {
        match self {
            MetadataTier::Level1 => RenderFlags {
                depth: true,
                object_mask: false,
                consistent_colors: false,
            },
            MetadataTier::Level2 => RenderFlags {
                depth: true,
                object_mask: true,
                consistent_colors: false,
            },
            MetadataTier::Default => RenderFlags::default(),
            MetadataTier::Oracle => RenderFlags {
                depth: true,
                object_mask: true,
                consistent_colors: true,
            },
        }
    }

    fn hides_agent_and_objects(&self) -> bool {
        *self <= MetadataTier::Level2
    }

    /// Redact a snapshot in place. Also redacts the embedded goal.
    pub fn filter_snapshot(&self, snapshot: &mut ObservationSnapshot) {
        if *self == MetadataTier::Level1 {
            snapshot.object_mask_list.clear();
        }
        match self {
            MetadataTier::Level1 | MetadataTier::Level2 => {
                snapshot.position = None;
                snapshot.rotation = None;
                snapshot.object_list.clear();
                snapshot.structural_object_list.clear();
            }
            MetadataTier::Default => {
                snapshot.object_list.retain(|o| o.visible);
                snapshot.structural_object_list.retain(|o| o.visible);
            }
            MetadataTier::Oracle => {}
        }
        self.filter_goal(&mut snapshot.goal);
    }

    /// Null out target-reveal images at restrictive tiers.
    pub fn filter_goal(&self, goal: &mut GoalDescriptor) {
        if !self.hides_agent_and_objects() {
            return;
        }
        for key in TARGET_KEYS {
            if let Some(JsonValue::Object(target)) = goal.metadata.get_mut(key) {
                if let Some(image) = target.get_mut("image") {
                    *image = JsonValue::Null;
                }
            }
        }
    }
}

impl fmt::Display for MetadataTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remove target images from goal metadata entirely, regardless of tier.
/// Persisted history never carries them.
pub fn strip_goal_images(metadata: &mut Map<String, JsonValue>) {
    for key in TARGET_KEYS {
        if let Some(JsonValue::Object(target)) = metadata.get_mut(key) {
            target.remove("image");
        }
    }
}
