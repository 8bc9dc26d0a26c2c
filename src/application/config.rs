use serde::{Deserialize, Serialize};

/// How the standard reversal action produces credit notes. Chosen once from
/// configuration; the wizard never looks for alternatives at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReversalAction {
    /// Create the credit notes already posted
    #[default]
    RefundMoves,
    /// Create draft credit notes; the wizard posts them before reconciling
    ReverseMoves,
}

impl ReversalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReversalAction::RefundMoves => "refund_moves",
            ReversalAction::ReverseMoves => "reverse_moves",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "refund_moves" | "refund" => Some(ReversalAction::RefundMoves),
            "reverse_moves" | "reverse" => Some(ReversalAction::ReverseMoves),
            _ => None,
        }
    }

    pub fn posts_immediately(&self) -> bool {
        matches!(self, ReversalAction::RefundMoves)
    }
}

impl std::fmt::Display for ReversalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Settings for the ledger service and the reversal wizard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardConfig {
    pub reversal_action: ReversalAction,
    /// Currency of every amount the ledger records
    pub company_currency: String,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            reversal_action: ReversalAction::default(),
            company_currency: "EUR".into(),
        }
    }
}

impl WizardConfig {
    pub fn with_reversal_action(mut self, action: ReversalAction) -> Self {
        self.reversal_action = action;
        self
    }

    pub fn with_company_currency(mut self, currency: impl Into<String>) -> Self {
        self.company_currency = currency.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reversal_action_parsing() {
        assert_eq!(
            ReversalAction::from_str("reverse-moves"),
            Some(ReversalAction::ReverseMoves)
        );
        assert_eq!(
            ReversalAction::from_str("REFUND"),
            Some(ReversalAction::RefundMoves)
        );
        assert_eq!(ReversalAction::from_str("cancel"), None);
    }

    #[test]
    fn test_defaults() {
        let config = WizardConfig::default();
        assert_eq!(config.reversal_action, ReversalAction::RefundMoves);
        assert!(config.reversal_action.posts_immediately());
        assert_eq!(config.company_currency, "EUR");
    }
}
