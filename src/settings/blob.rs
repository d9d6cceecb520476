//! Key/value settings blob parser.
//!
//! The blob is INI-shaped: `key=value` lines at the top level, optional
//! `[section]` headers grouping nested keys, `;` or `#` comment lines. Values
//! are split on the first `=` only, so base64 padding survives.

use std::collections::HashMap;

/// Parsed settings blob: top-level keys plus named sections.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SettingsBlob {
    root: HashMap<String, String>,
    sections: HashMap<String, HashMap<String, String>>,
}

impl SettingsBlob {
    /// Parse blob text. Malformed lines are skipped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut blob = Self::default();
        let mut section: Option<String> = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = name.trim().to_string();
                blob.sections.entry(name.clone()).or_default();
                section = Some(name);
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let target = match &section {
                Some(name) => blob.sections.entry(name.clone()).or_default(),
                None => &mut blob.root,
            };
            target.insert(key.trim().to_string(), value.trim().to_string());
        }

        blob
    }

    /// Top-level value, `None` when absent or empty
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.root.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Section by name
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&HashMap<String, String>> {
        self.sections.get(name)
    }
}
