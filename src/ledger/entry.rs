//! Ledger Entry
//!
//! Defines the immutable, hash-chained audit ledger entry and the
//! request type callers use to append one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

/// Who performed the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    User,
    ApiKey,
    System,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::ApiKey => "api_key",
            Self::System => "system",
        }
    }
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "api_key" => Ok(Self::ApiKey),
            "system" => Ok(Self::System),
            other => Err(LedgerError::Validation(format!(
                "Invalid actor type: {}. Must be user, api_key, or system",
                other
            ))),
        }
    }
}

/// Channel the action originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Web,
    Api,
    Mcp,
    System,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Api => "api",
            Self::Mcp => "mcp",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Self::Web),
            "api" => Ok(Self::Api),
            "mcp" => Ok(Self::Mcp),
            "system" => Ok(Self::System),
            other => Err(LedgerError::Validation(format!(
                "Invalid source: {}. Must be web, api, mcp, or system",
                other
            ))),
        }
    }
}

/// A persisted (or computed-but-unpersisted) audit ledger entry.
///
/// Once written to storage an entry is immutable; no API mutates or
/// deletes it. `sequence_id` is the sole source of total order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub sequence_id: i64,
    pub entry_id: String,
    pub previous_hash: String,
    pub entry_hash: String,
    pub actor_id: String,
    pub actor_type: ActorType,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub project_id: Option<String>,
    pub payload: Value,
    pub source: Source,
    pub ip_address: Option<String>,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Human-readable one-liner for logs.
    pub fn summary(&self) -> String {
        format!(
            "seq {}: {} {} on {}/{}",
            self.sequence_id, self.actor_id, self.action, self.entity_type, self.entity_id
        )
    }
}

/// Input to `AuditLedgerService::append`.
#[derive(Debug, Clone)]
pub struct AppendRequest {
    pub actor_id: String,
    pub actor_type: ActorType,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub project_id: Option<String>,
    pub payload: Value,
    pub source: Source,
    pub ip_address: Option<String>,
    pub session_id: Option<String>,
}

impl AppendRequest {
    pub fn new(
        actor_id: impl Into<String>,
        actor_type: ActorType,
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        source: Source,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            actor_type,
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            project_id: None,
            payload: Value::Null,
            source,
            ip_address: None,
            session_id: None,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Attach a structured payload (e.g. before/after snapshots). The
    /// payload is opaque to the ledger and hashed verbatim.
    pub fn with_payload(mut self, payload: impl Serialize) -> Result<Self, LedgerError> {
        self.payload = serde_json::to_value(payload)?;
        Ok(self)
    }

    pub fn with_request_metadata(
        mut self,
        ip_address: Option<String>,
        session_id: Option<String>,
    ) -> Self {
        self.ip_address = ip_address;
        self.session_id = session_id;
        self
    }

    /// Reject malformed requests before any sequencing or hashing.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.actor_id.trim().is_empty() {
            return Err(LedgerError::Validation("actor_id must not be empty".into()));
        }
        if self.action.trim().is_empty() {
            return Err(LedgerError::Validation("action must not be empty".into()));
        }
        if self.entity_type.trim().is_empty() {
            return Err(LedgerError::Validation(
                "entity_type must not be empty".into(),
            ));
        }
        if self.entity_id.trim().is_empty() {
            return Err(LedgerError::Validation("entity_id must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_actor_type_round_trip() {
        for actor_type in [ActorType::User, ActorType::ApiKey, ActorType::System] {
            assert_eq!(actor_type.as_str().parse::<ActorType>().unwrap(), actor_type);
        }
        assert!("robot".parse::<ActorType>().is_err());
    }

    #[test]
    fn test_source_round_trip() {
        for source in [Source::Web, Source::Api, Source::Mcp, Source::System] {
            assert_eq!(source.as_str().parse::<Source>().unwrap(), source);
        }
        assert!("cli".parse::<Source>().is_err());
    }

    #[test]
    fn test_request_validation() {
        let request = AppendRequest::new(
            "u1",
            ActorType::User,
            "project.update",
            "project",
            "p1",
            Source::Web,
        );
        assert!(request.validate().is_ok());

        let empty_actor = AppendRequest::new(
            "  ",
            ActorType::User,
            "project.update",
            "project",
            "p1",
            Source::Web,
        );
        assert!(matches!(
            empty_actor.validate(),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_request_payload() {
        let request = AppendRequest::new(
            "u1",
            ActorType::ApiKey,
            "task.create",
            "task",
            "t1",
            Source::Api,
        )
        .with_payload(json!({"after": {"title": "write spec"}}))
        .unwrap();

        assert_eq!(request.payload["after"]["title"], "write spec");
    }

    #[test]
    fn test_entry_serde_names() {
        let entry = LedgerEntry {
            sequence_id: 0,
            entry_id: "e-1".to_string(),
            previous_hash: "0".repeat(64),
            entry_hash: "f".repeat(64),
            actor_id: "u1".to_string(),
            actor_type: ActorType::ApiKey,
            action: "project.create".to_string(),
            entity_type: "project".to_string(),
            entity_id: "p1".to_string(),
            project_id: Some("p1".to_string()),
            payload: json!({}),
            source: Source::Mcp,
            ip_address: None,
            session_id: None,
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"sequenceId\":0"));
        assert!(json.contains("\"actorType\":\"api_key\""));
        assert!(json.contains("\"source\":\"mcp\""));

        let back: LedgerEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.entry_id, "e-1");
        assert_eq!(back.actor_type, ActorType::ApiKey);
    }
}
