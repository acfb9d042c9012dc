/// Represents an issue found during a static data-flow check of a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// A hard error: a required input key is guaranteed to be missing.
    Error(String),
    /// A warning: something that will not fail a run but is likely a mistake.
    Warning(String),
}

/// The result of a static data-flow check.
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

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.issues.iter().filter_map(|i| match i {
            ValidationIssue::Error(msg) => Some(msg.as_str()),
            ValidationIssue::Warning(_) => None,
        })
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.issues.iter().filter_map(|i| match i {
            ValidationIssue::Warning(msg) => Some(msg.as_str()),
            ValidationIssue::Error(_) => None,
        })
    }

    /// One line per issue, or a single success line.
    pub fn summary(&self) -> String {
        if self.issues.is_empty() {
            return "Graph check passed: all data-flow contracts are satisfied.".to_string();
        }
        self.issues
            .iter()
            .map(|issue| match issue {
                ValidationIssue::Error(msg) => format!("error: {}", msg),
                ValidationIssue::Warning(msg) => format!("warning: {}", msg),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Sends every issue to the logger at the matching level.
    pub fn log_summary(&self) {
        if self.issues.is_empty() {
            log::info!("{}", self.summary());
        }
        for issue in &self.issues {
            match issue {
                ValidationIssue::Error(msg) => log::error!("{}", msg),
                ValidationIssue::Warning(msg) => log::warn!("{}", msg),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_do_not_make_a_result_unsafe() {
        let mut result = ValidationResult::new();
        result.add_warning("optional input may be absent");
        assert!(result.is_safe());
        assert!(result.has_warnings());

        result.add_error("required input missing");
        assert!(!result.is_safe());
        assert_eq!(result.errors().collect::<Vec<_>>(), vec!["required input missing"]);
        assert_eq!(
            result.summary(),
            "warning: optional input may be absent\nerror: required input missing"
        );
    }
}
