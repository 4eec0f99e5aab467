use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::types::{LOCAL_FAULT, REM_SF};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long an alarm must stay active before an ALERT is sent.
    pub alarm_delay: Duration,

    /// How long an alerted alarm must stay gone before a CLEAR is sent.
    pub clear_delay: Duration,

    /// Which codes hide which, when both are active on the same
    /// correlation key.
    pub suppression: Vec<SuppressionRule>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alarm_delay: Duration::from_secs(30),
            clear_delay: Duration::from_secs(10),
            suppression: vec![SuppressionRule::new(LOCAL_FAULT, REM_SF)],
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SuppressionRuleError {
    #[error("Expected SUPPRESSOR>SUPPRESSED, got {0:?}")]
    Malformed(String),

    #[error("Alarm code {0:?} cannot suppress itself")]
    SelfSuppression(String),
}

/// While an alarm with code `suppressor` is active on a correlation key,
/// alarms with code `suppressed` on the same key are not progressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressionRule {
    pub suppressor: String,
    pub suppressed: String,
}

impl SuppressionRule {
    pub fn new(suppressor: impl Into<String>, suppressed: impl Into<String>) -> Self {
        Self {
            suppressor: suppressor.into(),
            suppressed: suppressed.into(),
        }
    }
}

impl fmt::Display for SuppressionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}>{}", self.suppressor, self.suppressed)
    }
}

impl FromStr for SuppressionRule {
    type Err = SuppressionRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (suppressor, suppressed) = s
            .split_once('>')
            .map(|(a, b)| (a.trim(), b.trim()))
            .filter(|(a, b)| !a.is_empty() && !b.is_empty() && !b.contains('>'))
            .ok_or_else(|| SuppressionRuleError::Malformed(s.to_string()))?;

        if suppressor == suppressed {
            return Err(SuppressionRuleError::SelfSuppression(suppressor.to_string()));
        }

        Ok(Self::new(suppressor, suppressed))
    }
}
