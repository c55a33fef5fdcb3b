//! Safety gate - lexical pre-execution check for command strings
//!
//! Checks run in a fixed order and the first failure wins:
//! 1. Length limit
//! 2. Blocked command names (case-insensitive substring match)
//! 3. Dangerous regex patterns (case-insensitive)
//!
//! This is a best-effort deterrent against naive dangerous invocations, not
//! an isolation boundary. Aliases, string concatenation and encoded commands
//! all get past it.

use std::sync::Arc;

use serde::Serialize;

use crate::policy::Policy;

/// Which rule rejected a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Denial {
    TooLong,
    BlockedCommand,
    DangerousPattern,
}

/// Allow/deny decision with the reason for a denial
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub is_safe: bool,
    /// Empty when safe
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial: Option<Denial>,
}

impl Verdict {
    fn allow() -> Self {
        Self {
            is_safe: true,
            reason: String::new(),
            denial: None,
        }
    }

    fn deny(denial: Denial, reason: String) -> Self {
        Self {
            is_safe: false,
            reason,
            denial: Some(denial),
        }
    }
}

/// Classify `command` under `policy`
///
/// Pure: no I/O, no logging, same answer every time for the same inputs.
pub fn check(command: &str, policy: &Policy) -> Verdict {
    if command.chars().count() > policy.max_command_length {
        return Verdict::deny(
            Denial::TooLong,
            format!("Command too long (max {} chars)", policy.max_command_length),
        );
    }

    // Substring, not whole-word: a blocked "rd" also matches "Standard"
    let lowered = command.to_lowercase();
    if let Some(blocked) = policy
        .blocked_commands
        .iter()
        .find(|b| lowered.contains(&b.to_lowercase()))
    {
        return Verdict::deny(
            Denial::BlockedCommand,
            format!("Blocked command detected: {}", blocked),
        );
    }

    if let Some(pattern) = policy.dangerous_patterns.iter().find(|p| p.is_match(command)) {
        return Verdict::deny(
            Denial::DangerousPattern,
            format!("Dangerous pattern detected: {}", pattern.as_str()),
        );
    }

    Verdict::allow()
}

/// Cheap-to-clone handle pairing the gate with its policy
#[derive(Debug, Clone)]
pub struct SafetyGate {
    policy: Arc<Policy>,
}

impl SafetyGate {
    pub fn new(policy: Arc<Policy>) -> Self {
        Self { policy }
    }

    pub fn check(&self, command: &str) -> Verdict {
        check(command, &self.policy)
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }
}
