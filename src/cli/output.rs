//! Printing command results as text or JSON.

use anyhow::{Context, Result};
use serde::Serialize;

/// A command result that renders for people and for scripts.
pub trait CommandOutput: Serialize {
    /// Plain-text rendering.
    fn to_human(&self) -> String;
}

/// Print `result` on stdout. JSON mode prints the serialized value; logs
/// never go to stdout, so the output stays parseable.
pub fn output<T: CommandOutput>(result: &T, json_mode: bool) -> Result<()> {
    if json_mode {
        let json = serde_json::to_string_pretty(result).context("Failed to serialize command output")?;
        println!("{json}");
    } else {
        println!("{}", result.to_human());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serializer;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("no json form"))
        }
    }

    impl CommandOutput for Unserializable {
        fn to_human(&self) -> String {
            "human".to_string()
        }
    }

    #[test]
    fn test_serialization_failure_is_reported() {
        assert!(output(&Unserializable, true).is_err());
        assert!(output(&Unserializable, false).is_ok());
    }
}
