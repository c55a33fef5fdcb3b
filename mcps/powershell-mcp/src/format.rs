//! Output formats applied by appending a conversion pipeline

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Output format requested by the caller
///
/// Anything but `text` appends a fixed `ConvertTo-*` stage to the command.
/// This is plain text concatenation and assumes the command can feed a
/// pipeline.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Xml,
    Csv,
}

impl OutputFormat {
    /// The pipeline suffix for this format, if any
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            OutputFormat::Text => None,
            OutputFormat::Json => Some(" | ConvertTo-Json -Depth 10"),
            OutputFormat::Xml => Some(" | ConvertTo-Xml -As String"),
            OutputFormat::Csv => Some(" | ConvertTo-Csv -NoTypeInformation"),
        }
    }

    /// Compose the command text that is actually executed
    pub fn apply(self, command: &str) -> String {
        match self.suffix() {
            Some(suffix) => format!("{command}{suffix}"),
            None => command.to_string(),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
            OutputFormat::Xml => "xml",
            OutputFormat::Csv => "csv",
        };
        f.write_str(name)
    }
}
