//! Key-value configuration store
//!
//! Settings live in a TOML file whose tables mirror the flat
//! `section/key` namespace the rest of the system uses:
//!
//! ```toml
//! [listen]
//! client = 9100
//! user = 9000
//! manager = 9384
//! ```
//!
//! Lookups take the caller's default when a key is absent or does not parse
//! as the requested type.

use crate::error::{Result, TunnelError};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use toml::Value;

/// Read-only view over a parsed configuration file.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    root: toml::Table,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| TunnelError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::parse(&text)
    }

    /// Parse settings from TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        let root = text
            .parse::<toml::Table>()
            .map_err(|e| TunnelError::Config(format!("invalid config: {e}")))?;
        Ok(Self { root })
    }

    /// Look up a `section/key` path, rendering scalars to text.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut parts = key.split('/');
        let first = parts.next()?;
        let mut value = self.root.get(first)?;
        for part in parts {
            value = value.get(part)?;
        }
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// String lookup with a caller-supplied default.
    pub fn value(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Numeric lookup; absent or unparsable values yield the default.
    pub fn number<T: FromStr + Copy>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}
