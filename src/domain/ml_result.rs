use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output of the classification stage. Each field is passed through as the
/// stage produced it: a plain label or a structured object with scores and
/// model metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlResult {
    pub service: Value,
    #[serde(alias = "urgency")]
    pub priority: Value,
    pub problem: Value,
}
