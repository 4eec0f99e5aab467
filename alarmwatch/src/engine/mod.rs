mod config;
mod notification;
mod reconciler;
mod state;

pub use config::{EngineConfig, SuppressionRule, SuppressionRuleError};
pub use notification::{AlertNotice, ClearNotice, Notification};
pub use reconciler::AlarmEngine;
pub use state::{AlarmPhase, EngineState};
