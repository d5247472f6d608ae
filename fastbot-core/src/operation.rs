//! The one value that crosses the boundary to the driver. Grounded on
//! `DeviceOperateWrapper.h` from the retrieved original source; fields
//! are flattened into a plain `serde`-serializable struct since there is
//! no device-side ABI to match byte-for-byte, only a JSON contract.

use serde::{Deserialize, Serialize};

use crate::action::ActionType;
use crate::rect::Rect;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Operation {
    pub act: ActWire,
    pub pos: Option<[i32; 4]>,
    pub throttle: f32,
    pub wait_time: u32,
    pub editable: bool,
    pub adb_input: bool,
    pub text: String,
    pub widget: Option<String>,
    pub sid: String,
    pub aid: u64,
}

impl Operation {
    pub fn nop() -> Self {
        Operation {
            act: ActWire(ActionType::Nop),
            pos: None,
            throttle: 0.0,
            wait_time: 0,
            editable: false,
            adb_input: false,
            text: String::new(),
            widget: None,
            sid: String::new(),
            aid: 0,
        }
    }

    pub fn new(act: ActionType, sid: String, aid: u64) -> Self {
        Operation {
            act: ActWire(act),
            pos: None,
            throttle: 100.0,
            wait_time: 0,
            editable: false,
            adb_input: false,
            text: String::new(),
            widget: None,
            sid,
            aid,
        }
    }

    pub fn with_pos(mut self, pos: Rect) -> Self {
        self.pos = Some(pos.as_array());
        self
    }

    pub fn with_editable(mut self, editable: bool) -> Self {
        self.editable = editable;
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// `ActionType` wrapped so it serializes as its stable wire name
/// (the `act` field of the wire JSON), independent of Rust's default
/// derive-based enum tagging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActWire(pub ActionType);

impl Serialize for ActWire {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.name())
    }
}

impl<'de> Deserialize<'de> for ActWire {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let act = crate::action::ALL_ACTION_TYPES
            .iter()
            .copied()
            .find(|a| a.name() == s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown action type {s}")))?;
        Ok(ActWire(act))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nop_serializes_with_null_position() {
        let op = Operation::nop();
        let json = op.to_json().unwrap();
        assert!(json.contains("\"act\":\"NOP\""));
        assert!(json.contains("\"pos\":null"));
    }

    #[test]
    fn click_round_trips_through_json() {
        let op = Operation::new(ActionType::Click, "s1".into(), 7).with_pos(Rect::new(0, 0, 10, 10));
        let json = op.to_json().unwrap();
        let back: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(back.act.0, ActionType::Click);
        assert_eq!(back.pos, Some([0, 0, 10, 10]));
        assert_eq!(back.sid, "s1");
    }
}
