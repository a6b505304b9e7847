//! Admin-socket protocol for platfand
//!
//! Line-delimited JSON over a Unix domain socket. Each request is one JSON
//! object on one line; each response is one JSON object on one line.

use serde::{Deserialize, Serialize};

/// Maximum message size for the admin socket (8KB)
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data")]
pub enum Request {
    Ping,
    Version,
    /// Human-readable snapshot of every subsystem and fan
    Dump,
    /// Persist an administrative speed override for one subsystem.
    /// `speed` is one of the five level names, or "none" to clear.
    SetOverride { subsystem: String, speed: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum ResponseData {
    Pong,
    Version(String),
    Dump(String),
}

impl Response {
    pub fn success(data: Option<ResponseData>) -> Self {
        Self {
            ok: true,
            error: None,
            data,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            data: None,
        }
    }
}

impl Request {
    /// Validate request parameters before they reach the engine
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Request::Ping | Request::Version | Request::Dump => Ok(()),
            Request::SetOverride { subsystem, speed } => {
                if subsystem.is_empty() {
                    return Err("subsystem name must not be empty".to_string());
                }
                match speed.as_str() {
                    "slow" | "normal" | "medium" | "fast" | "max" | "none" => Ok(()),
                    other => Err(format!("unknown speed level: {}", other)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_round_trip_through_json() {
        let req = Request::SetOverride {
            subsystem: "base".to_string(),
            speed: "fast".to_string(),
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: Request = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, Request::SetOverride { .. }));
    }

    #[test]
    fn override_levels_are_validated() {
        let ok = Request::SetOverride {
            subsystem: "base".to_string(),
            speed: "none".to_string(),
        };
        assert!(ok.validate().is_ok());

        let bad = Request::SetOverride {
            subsystem: "base".to_string(),
            speed: "warp".to_string(),
        };
        assert!(bad.validate().is_err());

        let empty = Request::SetOverride {
            subsystem: String::new(),
            speed: "slow".to_string(),
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn failure_responses_carry_the_error() {
        let resp = Response::failure("no such subsystem");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("no such subsystem"));
        let back: Response = serde_json::from_str(&json).unwrap();
        assert!(!back.ok);
    }
}
