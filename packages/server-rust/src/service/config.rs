use std::str::FromStr;

/// When the audit event for a create is published relative to persisting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmissionMode {
    /// Publish after the store answers, describing the actual outcome.
    #[default]
    Outcome,
    /// Publish the unsaved draft before persisting. The event can describe a
    /// create that later fails.
    PreFlight,
}

impl FromStr for EmissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "outcome" => Ok(Self::Outcome),
            "pre-flight" | "preflight" => Ok(Self::PreFlight),
            other => Err(format!("unknown emission mode: {other}")),
        }
    }
}

/// Domain service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Audit emission ordering for create.
    pub emission_mode: EmissionMode,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            emission_mode: EmissionMode::Outcome,
        }
    }
}
