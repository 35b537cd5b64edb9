use serde::{Deserialize, Serialize};
use shelfwise_session::SessionStack;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

pub struct CommandContext<'a> {
    pub stack: &'a SessionStack,
    pub addr: &'a str,
}
