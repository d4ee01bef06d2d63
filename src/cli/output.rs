use std::io::IsTerminal;

use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format: OutputFormat,
    pub pretty: bool,
    pub use_color: bool,
    pub verbose: bool,
}

impl OutputOptions {
    /// Print `value` as JSON, or hand it to `render` for text output.
    pub fn emit<T: Serialize>(&self, value: &T, render: impl FnOnce(&T, bool) -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", to_json(value, self.pretty)?),
            OutputFormat::Text => println!("{}", render(value, self.use_color)),
        }
        Ok(())
    }
}

pub fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

/// Resolve the `color` setting ("auto", "always" or "never") against the
/// `--no-color` flag, `NO_COLOR` and whether stdout is a terminal.
pub fn detect_color(color_flag: bool, setting: &str) -> bool {
    if !color_flag {
        return false;
    }
    match setting {
        "always" => true,
        "never" => false,
        _ => {
            if std::env::var("NO_COLOR").is_ok() {
                return false;
            }
            std::io::stdout().is_terminal()
        }
    }
}
