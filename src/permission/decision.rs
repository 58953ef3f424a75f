//! Permission decisions and outcomes

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::BridgeError;

/// Decision for one permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionDecision {
    /// Allow this occurrence only
    Allow,
    /// Allow, and persist as a standing policy for the tool
    AllowRemember,
    /// Deny; the owning channel is interrupted
    Deny,
}

impl PermissionDecision {
    pub fn is_allowed(self) -> bool {
        !matches!(self, PermissionDecision::Deny)
    }

    pub fn should_remember(self) -> bool {
        matches!(self, PermissionDecision::AllowRemember)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PermissionDecision::Allow => "allow",
            PermissionDecision::AllowRemember => "allow-remember",
            PermissionDecision::Deny => "deny",
        }
    }
}

impl fmt::Display for PermissionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the wire names plus the short answers `y`, `a` and `n`
impl FromStr for PermissionDecision {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" | "y" | "yes" => Ok(PermissionDecision::Allow),
            "allow-remember" | "a" | "always" => Ok(PermissionDecision::AllowRemember),
            "deny" | "n" | "no" => Ok(PermissionDecision::Deny),
            other => Err(BridgeError::config_error(format!(
                "unknown permission decision: {other}"
            ))),
        }
    }
}

/// What resolved a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// An explicit `resolve` call
    User,
    /// The deadline expired
    Timeout,
    /// Allowed by an earlier allow-remember decision for the tool
    Remembered,
}

/// Terminal state of a permission request, reported to listeners
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionOutcome {
    pub request_id: String,
    pub channel_id: String,
    pub tool_name: String,
    pub decision: PermissionDecision,
    pub source: DecisionSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answers() {
        assert_eq!("y".parse::<PermissionDecision>().unwrap(), PermissionDecision::Allow);
        assert_eq!(
            "Always".parse::<PermissionDecision>().unwrap(),
            PermissionDecision::AllowRemember
        );
        assert_eq!(" no\n".parse::<PermissionDecision>().unwrap(), PermissionDecision::Deny);
        assert!("maybe".parse::<PermissionDecision>().is_err());
    }

    #[test]
    fn test_decision_flags() {
        assert!(PermissionDecision::Allow.is_allowed());
        assert!(PermissionDecision::AllowRemember.is_allowed());
        assert!(PermissionDecision::AllowRemember.should_remember());
        assert!(!PermissionDecision::Deny.is_allowed());
        assert_eq!(
            serde_json::to_string(&PermissionDecision::AllowRemember).unwrap(),
            "\"allow-remember\""
        );
    }
}
