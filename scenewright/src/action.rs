// src/action.rs
//
// Action universe accepted by the session layer.
//
// - Action: closed set of client-facing action names
// - ActionCategory: how an action derives its move magnitude
// - engine synonyms for actions whose native engine validation is unreliable
// - parse_command: "RotateLook, rotation=45, horizon=15" command-line syntax

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as JsonValue};

use crate::types::RawParams;

/// Client-facing action names.
///
/// The string form (see [`Action::as_str`]) is what clients send and what
/// goal configurations list in their per-step permitted-action lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    CloseObject,
    Crawl,
    DropObject,
    EndHabituation,
    LieDown,
    MoveAhead,
    MoveBack,
    MoveLeft,
    MoveRight,
    OpenObject,
    Pass,
    PickupObject,
    PullObject,
    PushObject,
    PutObject,
    RotateLook,
    RotateObjectInHand,
    Stand,
    ThrowObject,
}

/// How the move magnitude of an action is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionCategory {
    /// Magnitude is a validated force fraction scaled by the variant's max force.
    Force,
    /// Magnitude is the validated amount taken directly.
    ObjectMove,
    /// Magnitude is the variant's per-step distance.
    Locomotion,
    /// Magnitude is the variant default.
    Other,
}

impl Action {
    /// Every supported action, in stable (alphabetical) order.
    pub const ALL: [Action; 19] = [
        Action::CloseObject,
        Action::Crawl,
        Action::DropObject,
        Action::EndHabituation,
        Action::LieDown,
        Action::MoveAhead,
        Action::MoveBack,
        Action::MoveLeft,
        Action::MoveRight,
        Action::OpenObject,
        Action::Pass,
        Action::PickupObject,
        Action::PullObject,
        Action::PushObject,
        Action::PutObject,
        Action::RotateLook,
        Action::RotateObjectInHand,
        Action::Stand,
        Action::ThrowObject,
    ];

    /// The no-op action used for preview phases.
    pub const NOOP: Action = Action::Pass;

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CloseObject => "CloseObject",
            Action::Crawl => "Crawl",
            Action::DropObject => "DropObject",
            Action::EndHabituation => "EndHabituation",
            Action::LieDown => "LieDown",
            Action::MoveAhead => "MoveAhead",
            Action::MoveBack => "MoveBack",
            Action::MoveLeft => "MoveLeft",
            Action::MoveRight => "MoveRight",
            Action::OpenObject => "OpenObject",
            Action::Pass => "Pass",
            Action::PickupObject => "PickupObject",
            Action::PullObject => "PullObject",
            Action::PushObject => "PushObject",
            Action::PutObject => "PutObject",
            Action::RotateLook => "RotateLook",
            Action::RotateObjectInHand => "RotateObjectInHand",
            Action::Stand => "Stand",
            Action::ThrowObject => "ThrowObject",
        }
    }

    /// Parse an exact (case-sensitive) action name. Returns None if unrecognized.
    pub fn parse(s: &str) -> Option<Action> {
        Action::ALL.iter().copied().find(|a| a.as_str() == s)
    }

    /// Map a single-character shortcut key to its action.
    pub fn from_shortcut(key: char) -> Option<Action> {
        let action = match key {
            'w' => Action::MoveAhead,
            'a' => Action::MoveLeft,
            's' => Action::MoveBack,
            'd' => Action::MoveRight,
            'r' => Action::RotateLook,
            'e' => Action::PickupObject,
            'f' => Action::PutObject,
            'g' => Action::DropObject,
            'q' => Action::ThrowObject,
            'o' => Action::OpenObject,
            'c' => Action::CloseObject,
            'p' => Action::Pass,
            'u' => Action::PushObject,
            'j' => Action::PullObject,
            'h' => Action::RotateObjectInHand,
            'x' => Action::Crawl,
            'l' => Action::LieDown,
            'z' => Action::Stand,
            'n' => Action::EndHabituation,
            _ => return None,
        };
        Some(action)
    }

    pub fn category(&self) -> ActionCategory {
        match self {
            Action::ThrowObject | Action::PushObject | Action::PullObject => ActionCategory::Force,
            Action::CloseObject | Action::OpenObject => ActionCategory::ObjectMove,
            Action::MoveAhead | Action::MoveBack | Action::MoveLeft | Action::MoveRight => {
                ActionCategory::Locomotion
            }
            _ => ActionCategory::Other,
        }
    }

    /// Name sent to the engine.
    ///
    /// Open/close use custom engine actions because the engine's own
    /// validation rejects valid requests for them; drop maps to the engine's
    /// hand-object variant. Everything else is sent verbatim.
    pub fn engine_name(&self) -> &'static str {
        match self {
            Action::CloseObject => "MCSCloseObject",
            Action::OpenObject => "MCSOpenObject",
            Action::DropObject => "DropHandObject",
            other => other.as_str(),
        }
    }

    /// Whether submitting this action ends the current habituation trial.
    pub fn is_habituation_boundary(&self) -> bool {
        matches!(self, Action::EndHabituation)
    }

    /// All action names, as owned strings.
    pub fn universe() -> Vec<String> {
        Action::ALL.iter().map(|a| a.as_str().to_string()).collect()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed command line: action name plus raw parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    /// Action name (a shortcut key is already expanded).
    pub action: String,
    /// Raw `key=value` parameters.
    pub params: RawParams,
    /// Tokens that could not be parsed as `key=value`.
    pub rejected_tokens: Vec<String>,
}

/// Parse a comma-separated command such as `"RotateLook, rotation=45, horizon=15"`.
///
/// The first token is the action; a single character is treated as a
/// shortcut key when it maps to one. Remaining tokens must be `key=value`.
/// Values that parse as finite numbers become JSON numbers; everything else
/// is kept as a string so the validator can substitute its default.
pub fn parse_command(line: &str) -> ParsedCommand {
    let mut tokens = line.split(',').map(str::trim);
    let head = tokens.next().unwrap_or_default();

    let mut chars = head.chars();
    let action = match (chars.next(), chars.next()) {
        (Some(key), None) => Action::from_shortcut(key)
            .map(|a| a.as_str().to_string())
            .unwrap_or_else(|| head.to_string()),
        _ => head.to_string(),
    };

    let mut params = Map::new();
    let mut rejected_tokens = Vec::new();
    for token in tokens {
        if token.is_empty() {
            continue;
        }
        match token.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                params.insert(key.trim().to_string(), parse_param_value(value.trim()));
            }
            _ => rejected_tokens.push(token.to_string()),
        }
    }

    ParsedCommand {
        action,
        params,
        rejected_tokens,
    }
}

fn parse_param_value(raw: &str) -> JsonValue {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(raw.to_string())),
        _ => JsonValue::String(raw.to_string()),
    }
}
