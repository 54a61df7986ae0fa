// src/params.rs
//
// Action parameter validation.
//
// Turns loosely-typed client parameters into bounded, engine-ready values.
// Validation never fails: absent values take their default, malformed values
// (non-numeric, NaN, inf) take their default and are reported, and numeric
// values are clamped into their documented range. Optional multiplicative
// noise is applied after clamping and is not re-clamped.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::action::{Action, ActionCategory};
use crate::types::{RawParams, Vec3};

/// Parameter defaults and ranges.
pub mod bounds {
    pub const ROTATION_DEFAULT: f64 = 0.0;
    pub const ROTATION_MIN: f64 = -360.0;
    pub const ROTATION_MAX: f64 = 360.0;

    pub const HORIZON_DEFAULT: f64 = 0.0;
    pub const HORIZON_MIN: f64 = -180.0;
    pub const HORIZON_MAX: f64 = 180.0;

    /// Force fraction, scaled by the variant's maximum force.
    pub const FORCE_DEFAULT: f64 = 0.5;
    pub const FORCE_MIN: f64 = 0.0;
    pub const FORCE_MAX: f64 = 1.0;

    pub const AMOUNT_DEFAULT: f64 = 0.5;
    /// Object-move actions (open/close) fully open or close by default.
    pub const AMOUNT_OBJECT_MOVE_DEFAULT: f64 = 1.0;
    pub const AMOUNT_MIN: f64 = 0.0;
    pub const AMOUNT_MAX: f64 = 1.0;

    pub const COORD_DEFAULT: f64 = 0.0;

    /// Noise is drawn uniformly from [-NOISE_HALF_WIDTH, NOISE_HALF_WIDTH).
    pub const NOISE_HALF_WIDTH: f64 = 0.5;
}

/// How targets are addressed and how magnitudes are scaled.
///
/// Chosen once per deployment in the session configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorVariant {
    /// Objects selected by 2-D screen points; fixed per-step distance.
    #[default]
    PixelCoords,
    /// Objects selected by 3-D direction vectors; amount-scaled distance.
    DirectionVector,
}

impl ValidatorVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidatorVariant::PixelCoords => "pixel_coords",
            ValidatorVariant::DirectionVector => "direction_vector",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pixel_coords" | "pixel" => Some(ValidatorVariant::PixelCoords),
            "direction_vector" | "direction" => Some(ValidatorVariant::DirectionVector),
            _ => None,
        }
    }

    /// Per-step locomotion distance (a fixed step, or the maximum step when
    /// scaled by amount).
    pub fn move_distance(&self) -> f64 {
        match self {
            ValidatorVariant::PixelCoords => 0.1,
            ValidatorVariant::DirectionVector => 0.5,
        }
    }

    pub fn max_force(&self) -> f64 {
        match self {
            ValidatorVariant::PixelCoords => 1.0,
            ValidatorVariant::DirectionVector => 50.0,
        }
    }

    /// Magnitude for actions outside the force/object-move/locomotion
    /// categories.
    pub fn default_magnitude(&self) -> f64 {
        match self {
            ValidatorVariant::PixelCoords => 0.1,
            ValidatorVariant::DirectionVector => 0.5,
        }
    }
}

/// Object or receptacle target in the variant's addressing scheme.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetVector {
    /// Screen point in engine convention (bottom-left origin).
    ImageCoords { x: f64, y: f64 },
    Direction(Vec3),
}

/// Sanitized, clamped, noise-adjusted parameters for one engine step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedParameters {
    pub rotation: f64,
    pub horizon: f64,
    pub amount: f64,
    pub force: f64,
    pub move_magnitude: f64,
    pub object_id: Option<String>,
    pub receptacle_object_id: Option<String>,
    pub object_target: TargetVector,
    pub receptacle_target: TargetVector,
}

/// Why a parameter did not pass through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    /// Present but not a finite number; default substituted.
    Malformed,
    /// Numeric but out of range; clamped.
    Clamped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamAdjustment {
    pub name: String,
    pub kind: AdjustmentKind,
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub params: ValidatedParameters,
    pub adjustments: Vec<ParamAdjustment>,
}

/// Draw one noise factor in [-NOISE_HALF_WIDTH, NOISE_HALF_WIDTH).
pub fn sample_noise<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen_range(-bounds::NOISE_HALF_WIDTH..bounds::NOISE_HALF_WIDTH)
}

#[derive(Debug, Clone, Copy)]
pub struct ParameterValidator {
    variant: ValidatorVariant,
    screen_height: u32,
}

impl ParameterValidator {
    pub fn new(variant: ValidatorVariant, screen_height: u32) -> Self {
        Self {
            variant,
            screen_height,
        }
    }

    pub fn variant(&self) -> ValidatorVariant {
        self.variant
    }

    /// Validate raw parameters for `action_name`.
    ///
    /// Names outside the action universe are validated as uncategorized
    /// actions. When `noise` is given, rotation, horizon and magnitude each get
    /// an independent multiplicative perturbation after clamping.
    pub fn validate<R: Rng + ?Sized>(
        &self,
        action_name: &str,
        raw: &RawParams,
        noise: Option<&mut R>,
    ) -> ValidationResult {
        let mut adjustments = Vec::new();
        let category = Action::parse(action_name)
            .map(|a| a.category())
            .unwrap_or(ActionCategory::Other);

        let mut rotation = bounded(
            raw,
            "rotation",
            bounds::ROTATION_DEFAULT,
            bounds::ROTATION_MIN,
            bounds::ROTATION_MAX,
            &mut adjustments,
        );
        let mut horizon = bounded(
            raw,
            "horizon",
            bounds::HORIZON_DEFAULT,
            bounds::HORIZON_MIN,
            bounds::HORIZON_MAX,
            &mut adjustments,
        );
        let amount_default = if category == ActionCategory::ObjectMove {
            bounds::AMOUNT_OBJECT_MOVE_DEFAULT
        } else {
            bounds::AMOUNT_DEFAULT
        };
        let amount = bounded(
            raw,
            "amount",
            amount_default,
            bounds::AMOUNT_MIN,
            bounds::AMOUNT_MAX,
            &mut adjustments,
        );
        let force = bounded(
            raw,
            "force",
            bounds::FORCE_DEFAULT,
            bounds::FORCE_MIN,
            bounds::FORCE_MAX,
            &mut adjustments,
        );

        let mut move_magnitude = match (category, self.variant) {
            (ActionCategory::Force, v) => force * v.max_force(),
            (ActionCategory::ObjectMove, _) => amount,
            (ActionCategory::Locomotion, ValidatorVariant::PixelCoords) => {
                ValidatorVariant::PixelCoords.move_distance()
            }
            (ActionCategory::Locomotion, ValidatorVariant::DirectionVector) => {
                amount * ValidatorVariant::DirectionVector.move_distance()
            }
            (ActionCategory::Other, v) => v.default_magnitude(),
        };

        if let Some(rng) = noise {
            rotation *= 1.0 + sample_noise(rng);
            horizon *= 1.0 + sample_noise(rng);
            move_magnitude *= 1.0 + sample_noise(rng);
        }

        let object_target = self.target(raw, "object", &mut adjustments);
        let receptacle_target = self.target(raw, "receptacleObject", &mut adjustments);

        ValidationResult {
            params: ValidatedParameters {
                rotation,
                horizon,
                amount,
                force,
                move_magnitude,
                object_id: identifier(raw, "objectId"),
                receptacle_object_id: identifier(raw, "receptacleObjectId"),
                object_target,
                receptacle_target,
            },
            adjustments,
        }
    }

    fn target(
        &self,
        raw: &RawParams,
        prefix: &str,
        adjustments: &mut Vec<ParamAdjustment>,
    ) -> TargetVector {
        match self.variant {
            ValidatorVariant::PixelCoords => {
                let x = unbounded(raw, &format!("{prefix}ImageCoordsX"), adjustments);
                let y = unbounded(raw, &format!("{prefix}ImageCoordsY"), adjustments);
                TargetVector::ImageCoords {
                    x,
                    y: flip_image_y(y, self.screen_height),
                }
            }
            ValidatorVariant::DirectionVector => TargetVector::Direction(Vec3::new(
                unbounded(raw, &format!("{prefix}DirectionX"), adjustments),
                unbounded(raw, &format!("{prefix}DirectionY"), adjustments),
                unbounded(raw, &format!("{prefix}DirectionZ"), adjustments),
            )),
        }
    }
}

/// Convert a top-left-origin Y coordinate to the engine's bottom-left origin.
///
/// Exactly zero passes through unflipped.
pub fn flip_image_y(y: f64, screen_height: u32) -> f64 {
    if y == 0.0 {
        y
    } else {
        f64::from(screen_height) - y
    }
}

fn numeric(
    raw: &RawParams,
    name: &str,
    default: f64,
    adjustments: &mut Vec<ParamAdjustment>,
) -> f64 {
    let Some(value) = raw.get(name) else {
        return default;
    };
    let parsed = match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => v,
        _ => {
            adjustments.push(ParamAdjustment {
                name: name.to_string(),
                kind: AdjustmentKind::Malformed,
            });
            default
        }
    }
}

fn bounded(
    raw: &RawParams,
    name: &str,
    default: f64,
    min: f64,
    max: f64,
    adjustments: &mut Vec<ParamAdjustment>,
) -> f64 {
    let value = numeric(raw, name, default, adjustments);
    let clamped = value.clamp(min, max);
    if (value - clamped).abs() > 1e-12 {
        adjustments.push(ParamAdjustment {
            name: name.to_string(),
            kind: AdjustmentKind::Clamped,
        });
    }
    clamped
}

fn unbounded(raw: &RawParams, name: &str, adjustments: &mut Vec<ParamAdjustment>) -> f64 {
    numeric(raw, name, bounds::COORD_DEFAULT, adjustments)
}

fn identifier(raw: &RawParams, name: &str) -> Option<String> {
    match raw.get(name)? {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_json::json;

    fn raw(value: JsonValue) -> RawParams {
        value.as_object().cloned().unwrap_or_default()
    }

    fn validate(variant: ValidatorVariant, action: &str, params: JsonValue) -> ValidationResult {
        ParameterValidator::new(variant, 400).validate::<ChaCha8Rng>(action, &raw(params), None)
    }

    #[test]
    fn missing_params_take_defaults_silently() {
        let r = validate(ValidatorVariant::PixelCoords, "RotateLook", json!({}));
        assert_eq!(r.params.rotation, bounds::ROTATION_DEFAULT);
        assert_eq!(r.params.horizon, bounds::HORIZON_DEFAULT);
        assert_eq!(r.params.amount, bounds::AMOUNT_DEFAULT);
        assert_eq!(r.params.force, bounds::FORCE_DEFAULT);
        assert_eq!(r.params.object_id, None);
        assert!(r.adjustments.is_empty());
    }

    #[test]
    fn malformed_params_take_defaults_and_are_reported() {
        let r = validate(
            ValidatorVariant::PixelCoords,
            "PushObject",
            json!({"rotation": "left", "force": null, "horizon": [1]}),
        );
        assert_eq!(r.params.rotation, bounds::ROTATION_DEFAULT);
        assert_eq!(r.params.horizon, bounds::HORIZON_DEFAULT);
        assert_eq!(r.params.force, bounds::FORCE_DEFAULT);
        assert_eq!(r.adjustments.len(), 3);
        assert!(r
            .adjustments
            .iter()
            .all(|a| a.kind == AdjustmentKind::Malformed));
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let r = validate(
            ValidatorVariant::PixelCoords,
            "RotateLook",
            json!({"rotation": "45", "horizon": " -10.5 "}),
        );
        assert_eq!(r.params.rotation, 45.0);
        assert_eq!(r.params.horizon, -10.5);
        assert!(r.adjustments.is_empty());
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let r = validate(
            ValidatorVariant::DirectionVector,
            "ThrowObject",
            json!({"rotation": 720, "horizon": -500, "amount": 3, "force": -2}),
        );
        assert_eq!(r.params.rotation, bounds::ROTATION_MAX);
        assert_eq!(r.params.horizon, bounds::HORIZON_MIN);
        assert_eq!(r.params.amount, 1.0);
        assert_eq!(r.params.force, 0.0);
        assert_eq!(r.params.move_magnitude, 0.0);
        assert_eq!(r.adjustments.len(), 4);
        assert!(r.adjustments.iter().all(|a| a.kind == AdjustmentKind::Clamped));
    }

    #[test]
    fn amount_and_force_stay_in_unit_interval() {
        for v in [-10.0, -0.1, 0.0, 0.3, 1.0, 1.7, 1e9] {
            let r = validate(
                ValidatorVariant::PixelCoords,
                "PushObject",
                json!({"amount": v, "force": v}),
            );
            assert!((0.0..=1.0).contains(&r.params.amount));
            assert!((0.0..=1.0).contains(&r.params.force));
        }
    }

    #[test]
    fn locomotion_magnitude_per_variant() {
        for action in ["MoveAhead", "MoveBack", "MoveLeft", "MoveRight"] {
            let fixed = validate(ValidatorVariant::PixelCoords, action, json!({"amount": 0.2}));
            assert_eq!(fixed.params.move_magnitude, 0.1);

            let scaled = validate(
                ValidatorVariant::DirectionVector,
                action,
                json!({"amount": 0.2}),
            );
            assert!((scaled.params.move_magnitude - 0.1).abs() < 1e-12);

            let default = validate(ValidatorVariant::DirectionVector, action, json!({}));
            assert!((default.params.move_magnitude - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn force_and_object_move_magnitudes() {
        let push = validate(ValidatorVariant::DirectionVector, "PushObject", json!({}));
        assert_eq!(push.params.move_magnitude, 25.0);
        let push = validate(ValidatorVariant::PixelCoords, "PushObject", json!({"force": 0.8}));
        assert!((push.params.move_magnitude - 0.8).abs() < 1e-12);

        let open = validate(ValidatorVariant::PixelCoords, "OpenObject", json!({}));
        assert_eq!(open.params.move_magnitude, 1.0);
        let close = validate(ValidatorVariant::PixelCoords, "CloseObject", json!({"amount": 0.25}));
        assert_eq!(close.params.move_magnitude, 0.25);

        let pass = validate(ValidatorVariant::DirectionVector, "Pass", json!({}));
        assert_eq!(pass.params.move_magnitude, 0.5);
        let unknown = validate(ValidatorVariant::PixelCoords, "Teleport", json!({}));
        assert_eq!(unknown.params.move_magnitude, 0.1);
    }

    #[test]
    fn image_y_is_flipped_except_zero() {
        let r = validate(
            ValidatorVariant::PixelCoords,
            "PickupObject",
            json!({
                "objectImageCoordsX": 120,
                "objectImageCoordsY": 100,
                "receptacleObjectImageCoordsY": 0
            }),
        );
        assert_eq!(
            r.params.object_target,
            TargetVector::ImageCoords { x: 120.0, y: 300.0 }
        );
        assert_eq!(
            r.params.receptacle_target,
            TargetVector::ImageCoords { x: 0.0, y: 0.0 }
        );
    }

    #[test]
    fn directions_pass_through() {
        let r = validate(
            ValidatorVariant::DirectionVector,
            "PutObject",
            json!({
                "objectId": "ball",
                "receptacleObjectId": "box",
                "receptacleObjectDirectionX": 0.5,
                "receptacleObjectDirectionZ": -1,
                "objectDirectionY": "up"
            }),
        );
        assert_eq!(r.params.object_id.as_deref(), Some("ball"));
        assert_eq!(r.params.receptacle_object_id.as_deref(), Some("box"));
        assert_eq!(
            r.params.receptacle_target,
            TargetVector::Direction(Vec3::new(0.5, 0.0, -1.0))
        );
        assert_eq!(r.params.object_target, TargetVector::Direction(Vec3::default()));
        assert_eq!(r.adjustments.len(), 1);
    }

    #[test]
    fn noise_is_applied_after_clamping_and_not_reclamped() {
        let validator = ParameterValidator::new(ValidatorVariant::PixelCoords, 400);
        let params = raw(json!({"rotation": 1000, "horizon": 180}));
        let mut saw_out_of_range = false;
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..64 {
            let r = validator.validate("RotateLook", &params, Some(&mut rng));
            let factor = r.params.rotation / bounds::ROTATION_MAX;
            assert!((0.5..1.5).contains(&factor));
            if r.params.rotation > bounds::ROTATION_MAX || r.params.horizon > bounds::HORIZON_MAX {
                saw_out_of_range = true;
            }
        }
        assert!(saw_out_of_range);
    }

    #[test]
    fn noise_is_deterministic_for_a_seed() {
        let validator = ParameterValidator::new(ValidatorVariant::DirectionVector, 400);
        let params = raw(json!({"rotation": 30, "horizon": 10, "amount": 0.4}));
        let mut a = ChaCha8Rng::seed_from_u64(42);
        let mut b = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..10 {
            let ra = validator.validate("MoveAhead", &params, Some(&mut a));
            let rb = validator.validate("MoveAhead", &params, Some(&mut b));
            assert_eq!(ra.params, rb.params);
        }
    }

    #[test]
    fn variant_names_parse() {
        assert_eq!(
            ValidatorVariant::parse("Direction_Vector"),
            Some(ValidatorVariant::DirectionVector)
        );
        assert_eq!(ValidatorVariant::parse("pixel"), Some(ValidatorVariant::PixelCoords));
        assert_eq!(ValidatorVariant::parse("grid"), None);
    }
}
