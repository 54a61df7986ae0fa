// src/reward.rs
//
// Task reward: 1 when the goal's completion predicate holds for the current
// object/agent state, 0 otherwise. Evaluated every step on the unfiltered
// object list; reward is not assumed to be monotone.

use serde_json::Value as JsonValue;

use crate::engine::MAX_REACH_DISTANCE;
use crate::goal::GoalDescriptor;
use crate::observation::{AgentSnapshot, ObjectRecord};

/// Maximum XZ distance between the two transferral targets for success.
pub const TRANSFERRAL_DISTANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalCategory {
    Retrieval,
    Transferral,
    Traversal,
    Other,
}

impl GoalCategory {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "retrieval" => GoalCategory::Retrieval,
            "transferral" => GoalCategory::Transferral,
            "traversal" => GoalCategory::Traversal,
            _ => GoalCategory::Other,
        }
    }
}

pub fn calculate(goal: &GoalDescriptor, objects: &[ObjectRecord], agent: &AgentSnapshot) -> i32 {
    let success = match GoalCategory::parse(goal.effective_category()) {
        GoalCategory::Retrieval => retrieval(goal, objects),
        GoalCategory::Transferral => transferral(goal, objects),
        GoalCategory::Traversal => traversal(goal, objects, agent),
        GoalCategory::Other => false,
    };
    i32::from(success)
}

fn target_id<'a>(goal: &'a GoalDescriptor, key: &str) -> Option<&'a str> {
    goal.metadata.get(key)?.get("id").and_then(JsonValue::as_str)
}

fn find<'a>(objects: &'a [ObjectRecord], id: &str) -> Option<&'a ObjectRecord> {
    objects.iter().find(|o| o.uuid == id)
}

fn retrieval(goal: &GoalDescriptor, objects: &[ObjectRecord]) -> bool {
    target_id(goal, "target")
        .and_then(|id| find(objects, id))
        .is_some_and(|o| o.held)
}

fn transferral(goal: &GoalDescriptor, objects: &[ObjectRecord]) -> bool {
    let (Some(first), Some(second)) = (
        target_id(goal, "target_1").and_then(|id| find(objects, id)),
        target_id(goal, "target_2").and_then(|id| find(objects, id)),
    ) else {
        return false;
    };
    if first.held {
        return false;
    }
    match (first.position, second.position) {
        (Some(a), Some(b)) => a.distance_xz(&b) <= TRANSFERRAL_DISTANCE,
        _ => false,
    }
}

fn traversal(goal: &GoalDescriptor, objects: &[ObjectRecord], agent: &AgentSnapshot) -> bool {
    let Some(target) = target_id(goal, "target").and_then(|id| find(objects, id)) else {
        return false;
    };
    match (agent.position, target.position) {
        (Some(a), Some(t)) => a.distance_xz(&t) <= MAX_REACH_DISTANCE,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vec3;
    use serde_json::json;

    fn goal(category: &str) -> GoalDescriptor {
        GoalDescriptor::from_scene_config(&json!({
            "goal": {
                "category": category,
                "metadata": {
                    "target": {"id": "ball"},
                    "target_1": {"id": "ball"},
                    "target_2": {"id": "box"}
                }
            }
        }))
    }

    fn obj(uuid: &str, held: bool, x: f64, z: f64) -> ObjectRecord {
        ObjectRecord {
            uuid: uuid.into(),
            held,
            position: Some(Vec3::new(x, 0.0, z)),
            ..Default::default()
        }
    }

    fn agent_at(x: f64, z: f64) -> AgentSnapshot {
        AgentSnapshot {
            position: Some(Vec3::new(x, 0.0, z)),
            ..Default::default()
        }
    }

    #[test]
    fn retrieval_requires_target_held() {
        let g = goal("Retrieval");
        let agent = agent_at(0.0, 0.0);
        assert_eq!(calculate(&g, &[obj("ball", false, 0.0, 0.0)], &agent), 0);
        assert_eq!(calculate(&g, &[obj("ball", true, 0.0, 0.0)], &agent), 1);
        assert_eq!(calculate(&g, &[obj("cup", true, 0.0, 0.0)], &agent), 0);
    }

    #[test]
    fn transferral_requires_placement() {
        let g = goal("transferral");
        let agent = agent_at(0.0, 0.0);
        let near = [obj("ball", false, 1.0, 1.0), obj("box", false, 1.3, 1.0)];
        assert_eq!(calculate(&g, &near, &agent), 1);
        let held = [obj("ball", true, 1.0, 1.0), obj("box", false, 1.0, 1.0)];
        assert_eq!(calculate(&g, &held, &agent), 0);
        let far = [obj("ball", false, 0.0, 0.0), obj("box", false, 2.0, 0.0)];
        assert_eq!(calculate(&g, &far, &agent), 0);
    }

    #[test]
    fn traversal_uses_reach_distance() {
        let g = goal("traversal");
        let objects = [obj("ball", false, 3.0, 0.0)];
        assert_eq!(calculate(&g, &objects, &agent_at(2.2, 0.0)), 1);
        assert_eq!(calculate(&g, &objects, &agent_at(0.0, 0.0)), 0);
        assert_eq!(calculate(&g, &objects, &AgentSnapshot::default()), 0);
    }

    #[test]
    fn unknown_category_is_zero() {
        let g = goal("intphys");
        assert_eq!(
            calculate(&g, &[obj("ball", true, 0.0, 0.0)], &agent_at(0.0, 0.0)),
            0
        );
        assert_eq!(
            calculate(&GoalDescriptor::default(), &[], &AgentSnapshot::default()),
            0
        );
    }

    #[test]
    fn reward_can_drop_back_to_zero() {
        let g = goal("retrieval");
        let agent = agent_at(0.0, 0.0);
        assert_eq!(calculate(&g, &[obj("ball", true, 0.0, 0.0)], &agent), 1);
        assert_eq!(calculate(&g, &[obj("ball", false, 0.0, 0.0)], &agent), 0);
    }
}
