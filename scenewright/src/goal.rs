// src/goal.rs
//
// Per-scene task configuration.
//
// A GoalDescriptor is built once from the scene configuration at
// start_scene and never mutated afterwards. Missing or ill-typed fields fall
// back to documented defaults: no permitted-action restriction, zero
// habituation trials, no preview phase, no step budget.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::warn;

use crate::action::Action;

/// Immutable per-scene task configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalDescriptor {
    /// Permitted actions per post-preview step. An empty entry (or an index
    /// past the end) means "no restriction" for that step.
    pub action_list: Option<Vec<Vec<String>>>,
    /// Goal category (e.g. "retrieval"); empty when not given.
    pub category: String,
    /// Human-readable goal description.
    pub description: String,
    pub domain_list: Vec<String>,
    pub type_list: Vec<String>,
    pub info_list: Vec<String>,
    /// Number of habituation trials in the scene.
    pub habituation_total: u32,
    /// Number of scripted no-op steps before the scene proper starts.
    pub last_preview_phase_step: u32,
    /// Step budget, counted on the scene-step index. None means unlimited.
    pub last_step: Option<u32>,
    /// When set, the client drives the preview phase itself.
    pub skip_preview_phase: bool,
    /// Free-form task metadata (targets, ground truth, ...).
    pub metadata: Map<String, JsonValue>,
}

impl GoalDescriptor {
    /// Build a goal from a scene configuration mapping.
    ///
    /// Reads the `goal` key; a configuration without one yields the default
    /// (unrestricted) goal.
    pub fn from_scene_config(scene: &JsonValue) -> Self {
        let Some(goal) = scene.get("goal").and_then(JsonValue::as_object) else {
            return Self::default();
        };

        let category = string_field(goal, "category");
        let mut metadata = goal
            .get("metadata")
            .and_then(JsonValue::as_object)
            .cloned()
            .unwrap_or_default();
        // Older scene files only carry the category at the goal level.
        if goal.contains_key("category") {
            metadata.insert("category".to_string(), JsonValue::String(category.clone()));
        }

        Self {
            action_list: goal.get("action_list").and_then(parse_action_list),
            category,
            description: string_field(goal, "description"),
            domain_list: string_list_field(goal, "domain_list"),
            type_list: string_list_field(goal, "type_list"),
            info_list: string_list_field(goal, "info_list"),
            habituation_total: u32_field(goal, "habituation_total").unwrap_or(0),
            last_preview_phase_step: u32_field(goal, "last_preview_phase_step").unwrap_or(0),
            last_step: u32_field(goal, "last_step"),
            skip_preview_phase: goal.contains_key("skip_preview_phase"),
            metadata,
        }
    }

    /// Actions permitted at the given scene-step index.
    ///
    /// Inside the preview window only the no-op is allowed. Afterwards the
    /// configured list for the post-preview index is used when present and
    /// non-empty; otherwise every supported action is allowed. The result is
    /// never empty.
    pub fn permitted_actions(&self, step_index: u32) -> Vec<String> {
        if step_index < self.last_preview_phase_step {
            return vec![Action::NOOP.as_str().to_string()];
        }
        let adjusted = (step_index - self.last_preview_phase_step) as usize;
        match self.action_list.as_ref().and_then(|list| list.get(adjusted)) {
            Some(entry) if !entry.is_empty() => entry.clone(),
            _ => Action::universe(),
        }
    }

    /// Whether the step budget is exhausted at the given scene-step index.
    pub fn budget_exhausted(&self, step_index: u32) -> bool {
        self.last_step.is_some_and(|last| step_index >= last)
    }

    /// Category used for reward evaluation: the goal-level category, falling
    /// back to `metadata.category`.
    pub fn effective_category(&self) -> &str {
        if !self.category.is_empty() {
            return &self.category;
        }
        self.metadata
            .get("category")
            .and_then(JsonValue::as_str)
            .unwrap_or("")
    }
}

fn string_field(obj: &Map<String, JsonValue>, key: &str) -> String {
    obj.get(key)
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string()
}

fn string_list_field(obj: &Map<String, JsonValue>, key: &str) -> Vec<String> {
    obj.get(key)
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn u32_field(obj: &Map<String, JsonValue>, key: &str) -> Option<u32> {
    let value = obj.get(key)?;
    if value.is_null() {
        return None;
    }
    match value.as_u64().and_then(|v| u32::try_from(v).ok()) {
        Some(v) => Some(v),
        None => {
            warn!(field = key, value = %value, "goal field is not a non-negative integer; using default");
            None
        }
    }
}

fn parse_action_list(value: &JsonValue) -> Option<Vec<Vec<String>>> {
    let steps = value.as_array()?;
    let parsed = steps
        .iter()
        .enumerate()
        .map(|(i, step)| match step.as_array() {
            Some(names) => names
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::to_string)
                .collect(),
            None => {
                warn!(index = i, "goal action_list entry is not a list; treating as unrestricted");
                Vec::new()
            }
        })
        .collect();
    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_goal_uses_defaults() {
        let goal = GoalDescriptor::from_scene_config(&json!({"name": "scene"}));
        assert_eq!(goal, GoalDescriptor::default());
        assert_eq!(goal.permitted_actions(0), Action::universe());
        assert!(!goal.budget_exhausted(10_000));
    }

    #[test]
    fn reads_all_fields() {
        let goal = GoalDescriptor::from_scene_config(&json!({
            "goal": {
                "action_list": [["Pass"], [], ["MoveAhead", "RotateLook"]],
                "category": "retrieval",
                "description": "find the ball",
                "habituation_total": 3,
                "last_preview_phase_step": 2,
                "last_step": 30,
                "metadata": {"target": {"id": "ball"}},
                "skip_preview_phase": true
            }
        }));
        assert_eq!(goal.category, "retrieval");
        assert_eq!(goal.habituation_total, 3);
        assert_eq!(goal.last_preview_phase_step, 2);
        assert_eq!(goal.last_step, Some(30));
        assert!(goal.skip_preview_phase);
        assert_eq!(goal.metadata["category"], json!("retrieval"));
        assert_eq!(goal.metadata["target"]["id"], json!("ball"));
    }

    #[test]
    fn preview_window_permits_only_noop() {
        let goal = GoalDescriptor::from_scene_config(&json!({
            "goal": {"last_preview_phase_step": 2}
        }));
        assert_eq!(goal.permitted_actions(0), vec!["Pass".to_string()]);
        assert_eq!(goal.permitted_actions(1), vec!["Pass".to_string()]);
        assert_eq!(goal.permitted_actions(2), Action::universe());
    }

    #[test]
    fn configured_list_is_indexed_after_preview() {
        let goal = GoalDescriptor::from_scene_config(&json!({
            "goal": {
                "last_preview_phase_step": 1,
                "action_list": [["MoveAhead"], [], ["RotateLook"]]
            }
        }));
        assert_eq!(goal.permitted_actions(0), vec!["Pass".to_string()]);
        assert_eq!(goal.permitted_actions(1), vec!["MoveAhead".to_string()]);
        // Empty entry -> unrestricted.
        assert_eq!(goal.permitted_actions(2), Action::universe());
        assert_eq!(goal.permitted_actions(3), vec!["RotateLook".to_string()]);
        // Past the configured list -> unrestricted.
        assert_eq!(goal.permitted_actions(4), Action::universe());
    }

    #[test]
    fn permitted_actions_is_pure() {
        let goal = GoalDescriptor::from_scene_config(&json!({
            "goal": {"action_list": [["Stand"]]}
        }));
        let a = goal.permitted_actions(0);
        let b = goal.permitted_actions(0);
        assert_eq!(a, b);
    }

    #[test]
    fn ill_typed_fields_fall_back() {
        let goal = GoalDescriptor::from_scene_config(&json!({
            "goal": {
                "habituation_total": -1,
                "last_preview_phase_step": "two",
                "last_step": null,
                "action_list": ["MoveAhead", ["Pass"]]
            }
        }));
        assert_eq!(goal.habituation_total, 0);
        assert_eq!(goal.last_preview_phase_step, 0);
        assert_eq!(goal.last_step, None);
        assert_eq!(goal.permitted_actions(0), Action::universe());
        assert_eq!(goal.permitted_actions(1), vec!["Pass".to_string()]);
    }

    #[test]
    fn budget_counts_scene_steps() {
        let goal = GoalDescriptor::from_scene_config(&json!({"goal": {"last_step": 2}}));
        assert!(!goal.budget_exhausted(0));
        assert!(!goal.budget_exhausted(1));
        assert!(goal.budget_exhausted(2));
    }

    #[test]
    fn effective_category_falls_back_to_metadata() {
        let goal = GoalDescriptor::from_scene_config(&json!({
            "goal": {"metadata": {"category": "traversal"}}
        }));
        assert_eq!(goal.effective_category(), "traversal");
    }
}
