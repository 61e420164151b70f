//! Adaptation actions and their wire form.
//!
//! `Action` is the in-process tagged form: one variant per kind, each
//! carrying exactly the parameters it needs. `ControlCommand` is what goes
//! over the transport and into the decision log:
//!
//! ```text
//! {"lot_id": "lot_1", "action": "increase_price",
//!  "parameters": {"new_price": 6.0},
//!  "timestamp": "2024-05-01T08:00:00Z", "reason": "High occupancy detected (92%)"}
//! ```
//!
//! Decoding a command is fallible (`CommandError`) because the payload may
//! come from outside the process.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CommandError;
use crate::types::LotId;

/// Discriminant of an [`Action`], as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    NoOp,
    IncreasePrice,
    DecreasePrice,
    CloseGate,
    OpenGate,
    RedirectVehicles,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::NoOp => "no_op",
            ActionKind::IncreasePrice => "increase_price",
            ActionKind::DecreasePrice => "decrease_price",
            ActionKind::CloseGate => "close_gate",
            ActionKind::OpenGate => "open_gate",
            ActionKind::RedirectVehicles => "redirect_vehicles",
        }
    }

    /// Expected effect recorded alongside decisions of this kind.
    pub fn expected_outcome(&self) -> &'static str {
        match self {
            ActionKind::NoOp => "no change",
            ActionKind::IncreasePrice => "reduced arrival rate, increased revenue per vehicle",
            ActionKind::DecreasePrice => "increased arrival rate, improved utilization",
            ActionKind::CloseGate => "controlled inflow, queue management",
            ActionKind::OpenGate => "resumed normal operations",
            ActionKind::RedirectVehicles => "overflow management, reduced rejections",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "no_op" | "no_action" => Ok(ActionKind::NoOp),
            "increase_price" => Ok(ActionKind::IncreasePrice),
            "decrease_price" => Ok(ActionKind::DecreasePrice),
            "close_gate" => Ok(ActionKind::CloseGate),
            "open_gate" => Ok(ActionKind::OpenGate),
            "redirect_vehicles" => Ok(ActionKind::RedirectVehicles),
            _ => Err(CommandError::UnknownAction(s.to_string())),
        }
    }
}

/// What the planner decided to do with a lot.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    NoOp,
    IncreasePrice { new_price: f64 },
    DecreasePrice { new_price: f64 },
    CloseGate,
    OpenGate,
    RedirectVehicles { target_lot: LotId },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::NoOp => ActionKind::NoOp,
            Action::IncreasePrice { .. } => ActionKind::IncreasePrice,
            Action::DecreasePrice { .. } => ActionKind::DecreasePrice,
            Action::CloseGate => ActionKind::CloseGate,
            Action::OpenGate => ActionKind::OpenGate,
            Action::RedirectVehicles { .. } => ActionKind::RedirectVehicles,
        }
    }

    pub fn is_no_op(&self) -> bool {
        matches!(self, Action::NoOp)
    }
}

/// A planned adaptation for one lot. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptationAction {
    pub lot_id: LotId,
    pub action: Action,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl AdaptationAction {
    pub fn new(lot_id: &str, action: Action, reason: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            lot_id: lot_id.to_string(),
            action,
            reason: reason.into(),
            timestamp,
        }
    }

    pub fn no_op(lot_id: &str, reason: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(lot_id, Action::NoOp, reason, timestamp)
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }
}

/// Parameters block of a [`ControlCommand`]. Absent fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_lot: Option<LotId>,
}

/// Serialized form of an [`AdaptationAction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub lot_id: LotId,
    pub action: String,
    #[serde(default)]
    pub parameters: CommandParameters,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
}

impl ControlCommand {
    /// Decode the tagged action carried by this command.
    pub fn decode(&self) -> Result<Action, CommandError> {
        let kind: ActionKind = self.action.parse()?;
        let action = match kind {
            ActionKind::NoOp => Action::NoOp,
            ActionKind::IncreasePrice => Action::IncreasePrice {
                new_price: self.price_param(kind)?,
            },
            ActionKind::DecreasePrice => Action::DecreasePrice {
                new_price: self.price_param(kind)?,
            },
            ActionKind::CloseGate => Action::CloseGate,
            ActionKind::OpenGate => Action::OpenGate,
            ActionKind::RedirectVehicles => {
                let target = self
                    .parameters
                    .target_lot
                    .as_deref()
                    .ok_or(CommandError::MissingParameter {
                        action: kind.as_str(),
                        parameter: "target_lot",
                    })?;
                if target.is_empty() || target == self.lot_id {
                    return Err(CommandError::InvalidParameter {
                        action: kind.as_str(),
                        parameter: "target_lot",
                    });
                }
                Action::RedirectVehicles {
                    target_lot: target.to_string(),
                }
            }
        };
        Ok(action)
    }

    fn price_param(&self, kind: ActionKind) -> Result<f64, CommandError> {
        let price = self.parameters.new_price.ok_or(CommandError::MissingParameter {
            action: kind.as_str(),
            parameter: "new_price",
        })?;
        if !price.is_finite() || price < 0.0 {
            return Err(CommandError::InvalidParameter {
                action: kind.as_str(),
                parameter: "new_price",
            });
        }
        Ok(price)
    }
}

impl From<&AdaptationAction> for ControlCommand {
    fn from(a: &AdaptationAction) -> Self {
        let parameters = match &a.action {
            Action::IncreasePrice { new_price } | Action::DecreasePrice { new_price } => {
                CommandParameters {
                    new_price: Some(*new_price),
                    target_lot: None,
                }
            }
            Action::RedirectVehicles { target_lot } => CommandParameters {
                new_price: None,
                target_lot: Some(target_lot.clone()),
            },
            Action::NoOp | Action::CloseGate | Action::OpenGate => CommandParameters::default(),
        };
        ControlCommand {
            lot_id: a.lot_id.clone(),
            action: a.kind().as_str().to_string(),
            parameters,
            timestamp: a.timestamp,
            reason: a.reason.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn command_json_shape() {
        let action = AdaptationAction::new(
            "lot_1",
            Action::IncreasePrice { new_price: 6.0 },
            "High occupancy detected (92%)",
            at(),
        );
        let cmd = ControlCommand::from(&action);
        let json = serde_json::to_value(&cmd).unwrap();

        assert_eq!(json["lot_id"], "lot_1");
        assert_eq!(json["action"], "increase_price");
        assert_eq!(json["parameters"]["new_price"], 6.0);
        assert!(json["parameters"].get("target_lot").is_none());
        assert_eq!(json["timestamp"], "2024-05-01T08:00:00Z");
        assert_eq!(json["reason"], "High occupancy detected (92%)");
    }

    #[test]
    fn gate_command_has_empty_parameters() {
        let cmd = ControlCommand::from(&AdaptationAction::new("lot_2", Action::CloseGate, "queue", at()));
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["parameters"], serde_json::json!({}));
        assert_eq!(cmd.decode().unwrap(), Action::CloseGate);
    }

    #[test]
    fn redirect_decodes_target() {
        let action = Action::RedirectVehicles {
            target_lot: "lot_2".to_string(),
        };
        let cmd = ControlCommand::from(&AdaptationAction::new("lot_1", action.clone(), "full", at()));
        assert_eq!(cmd.decode().unwrap(), action);
    }

    #[test]
    fn unknown_action_kind_is_an_error() {
        let raw = r#"{"lot_id":"lot_1","action":"launch_rockets","timestamp":"2024-05-01T08:00:00Z"}"#;
        let cmd: ControlCommand = serde_json::from_str(raw).unwrap();
        assert_eq!(
            cmd.decode(),
            Err(CommandError::UnknownAction("launch_rockets".to_string()))
        );
    }

    #[test]
    fn price_command_without_price_is_an_error() {
        let raw = r#"{"lot_id":"lot_1","action":"decrease_price","parameters":{},"timestamp":"2024-05-01T08:00:00Z"}"#;
        let cmd: ControlCommand = serde_json::from_str(raw).unwrap();
        assert!(matches!(cmd.decode(), Err(CommandError::MissingParameter { .. })));
    }

    #[test]
    fn redirect_to_self_is_rejected() {
        let raw = r#"{"lot_id":"lot_1","action":"redirect_vehicles","parameters":{"target_lot":"lot_1"},"timestamp":"2024-05-01T08:00:00Z"}"#;
        let cmd: ControlCommand = serde_json::from_str(raw).unwrap();
        assert!(matches!(cmd.decode(), Err(CommandError::InvalidParameter { .. })));
    }

    #[test]
    fn legacy_no_action_name_is_accepted() {
        assert_eq!("no_action".parse::<ActionKind>().unwrap(), ActionKind::NoOp);
        assert_eq!("OPEN_GATE".parse::<ActionKind>().unwrap(), ActionKind::OpenGate);
    }
}
