//! Outbound message envelope

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Kind of EOL data, selects the routing key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DataCategory {
    Software,
    Hardware,
}

/// Body published to the broker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EolEnvelope {
    #[serde(rename = "requestId")]
    pub request_id: String,

    pub eol_data: serde_json::Value,

    /// ISO-8601, UTC
    pub timestamp: String,
}

impl EolEnvelope {
    /// Wrap `data` under a fresh request id
    pub fn new(eol_data: serde_json::Value) -> Self {
        Self::with_request_id(uuid::Uuid::new_v4().to_string(), eol_data)
    }

    pub fn with_request_id(request_id: String, eol_data: serde_json::Value) -> Self {
        Self {
            request_id,
            eol_data,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
