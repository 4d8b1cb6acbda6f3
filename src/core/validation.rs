/// Represents an issue found while validating a mining setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// A hard error: the run cannot proceed with this setting.
    Error(String),
    /// A warning: the run proceeds but may stall or degrade.
    Warning(String),
}

/// The result of a validation pass.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.issues.push(ValidationIssue::Error(msg.into()));
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.issues.push(ValidationIssue::Warning(msg.into()));
    }

    pub fn is_safe(&self) -> bool {
        !self.issues.iter().any(|i| matches!(i, ValidationIssue::Error(_)))
    }

    pub fn has_warnings(&self) -> bool {
        self.issues.iter().any(|i| matches!(i, ValidationIssue::Warning(_)))
    }

    /// Messages of the hard errors only.
    pub fn errors(&self) -> Vec<&str> {
        self.issues
            .iter()
            .filter_map(|i| match i {
                ValidationIssue::Error(msg) => Some(msg.as_str()),
                ValidationIssue::Warning(_) => None,
            })
            .collect()
    }

    pub fn log_summary(&self) {
        if self.is_safe() && !self.has_warnings() {
            log::debug!("Configuration validation passed");
            return;
        }

        for issue in &self.issues {
            match issue {
                ValidationIssue::Error(msg) => log::error!("Invalid configuration: {}", msg),
                ValidationIssue::Warning(msg) => log::warn!("Configuration warning: {}", msg),
            }
        }
    }
}
