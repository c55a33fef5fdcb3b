//! Immutable command policy handed to the safety gate and runner

use regex::{Regex, RegexBuilder};

use crate::config::SecurityConfig;
use crate::types::ExecError;

/// Limits and pattern lists governing what commands may run
///
/// Built once from configuration and shared behind an `Arc`. Reconfiguring
/// means building a new `Policy`, never mutating this one.
#[derive(Debug, Clone)]
pub struct Policy {
    pub max_command_length: usize,
    pub blocked_commands: Vec<String>,
    /// Compiled case-insensitively; `as_str()` gives back the configured text
    pub dangerous_patterns: Vec<Regex>,
    pub execution_policy: String,
    pub default_timeout_secs: u64,
}

impl Policy {
    /// Compile a policy from the security section of the config
    pub fn from_config(security: &SecurityConfig) -> Result<Self, ExecError> {
        let dangerous_patterns = security
            .dangerous_patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| ExecError::InvalidPattern {
                        pattern: p.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            max_command_length: security.max_command_length,
            blocked_commands: security.blocked_commands.clone(),
            dangerous_patterns,
            execution_policy: security.execution_policy.clone(),
            default_timeout_secs: security.command_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_default_config() {
        let policy = Policy::from_config(&SecurityConfig::default()).unwrap();
        assert_eq!(policy.max_command_length, 5000);
        assert_eq!(policy.default_timeout_secs, 30);
        assert_eq!(policy.execution_policy, "Restricted");
        assert_eq!(policy.dangerous_patterns.len(), 18);
        assert_eq!(policy.dangerous_patterns[2].as_str(), "Format-Volume");
    }

    #[test]
    fn test_patterns_are_case_insensitive() {
        let policy = Policy::from_config(&SecurityConfig::default()).unwrap();
        let format_volume = &policy.dangerous_patterns[2];
        assert!(format_volume.is_match("format-volume -DriveLetter D"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let security = SecurityConfig {
            dangerous_patterns: vec!["[unterminated".to_string()],
            ..SecurityConfig::default()
        };

        let err = Policy::from_config(&security).unwrap_err();
        assert!(matches!(err, ExecError::InvalidPattern { ref pattern, .. } if pattern == "[unterminated"));
    }
}
