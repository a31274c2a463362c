// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::ConfigError;

/// Read `KEY=VALUE` lines from an environment file. Blank lines, `#`
/// comments and lines without `=` are ignored; an `export ` prefix and
/// surrounding quotes are stripped.
pub fn parse_environment_file(path: &Path) -> std::io::Result<Vec<(String, String)>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.strip_prefix("export ").unwrap_or(line))
        .filter_map(split_entry)
        .map(|(key, value)| (key.to_string(), unquote(value.trim()).to_string()))
        .collect())
}

/// Parse a single `KEY=VALUE` command line entry.
pub fn parse_env_entry(entry: &str) -> Result<(String, String), ConfigError> {
    split_entry(entry)
        .map(|(key, value)| (key.to_string(), unquote(value).to_string()))
        .ok_or_else(|| ConfigError::InvalidEnvironment(entry.to_string()))
}

fn split_entry(entry: &str) -> Option<(&str, &str)> {
    let (key, value) = entry.split_once('=')?;
    let key = key.trim();
    (!key.is_empty()).then_some((key, value))
}

/// Inherited variables first, then each layer in order; later layers win.
pub fn merge_environment<I, L>(inherited: I, layers: &[L]) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
    L: AsRef<[(String, String)]>,
{
    let mut merged: BTreeMap<String, String> = inherited.into_iter().collect();
    for layer in layers {
        for (key, value) in layer.as_ref() {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Strip one pair of matching surrounding quotes.
fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2
            && let Some(inner) = value
                .strip_prefix(quote)
                .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
