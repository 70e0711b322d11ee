//! Configuration of a fit contribution.

use serde::{Deserialize, Serialize};

/// Residual form used by a contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualForm {
    /// `(eq - y) / dy`
    Chiv,

    /// `(eq - y) / sqrt(sum(y**2))`
    Resv,

    /// Free-form expression over `eq`, the profile names and parameters
    Custom(String),
}

impl ResidualForm {
    /// Interpret a residual string: `"chiv"` and `"resv"` name the built-in
    /// forms, anything else is a custom expression.
    pub fn parse(source: &str) -> Self {
        match source.trim() {
            "chiv" => ResidualForm::Chiv,
            "resv" => ResidualForm::Resv,
            other => ResidualForm::Custom(other.to_string()),
        }
    }

    /// Expression string of this form for the given profile names.
    pub fn source(&self, y: &str, dy: &str) -> String {
        match self {
            ResidualForm::Chiv => format!("(eq - {}) / {}", y, dy),
            ResidualForm::Resv => format!("(eq - {}) / sum({}**2)**0.5", y, y),
            ResidualForm::Custom(source) => source.clone(),
        }
    }
}

/// Configuration options for a fit contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContributionConfig {
    /// Value of parameters created by `set_equation`. Default: 1.0
    pub new_parameter_value: f64,

    /// Whether `set_equation` may create parameters for unknown names. Default: true
    pub allow_new_vars: bool,

    /// Residual installed when none was chosen explicitly. Default: chiv
    pub default_residual: ResidualForm,
}

impl Default for ContributionConfig {
    fn default() -> Self {
        Self {
            new_parameter_value: 1.0,
            allow_new_vars: true,
            default_residual: ResidualForm::Chiv,
        }
    }
}
