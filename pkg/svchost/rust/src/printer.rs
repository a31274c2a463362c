// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::HashMap;
use std::fmt::Display;
use std::io::{self, Write};

struct Item {
    indent: usize,
    key: String,
    value: Option<String>,
}

/// Aligned `key : value` listing. Keys are padded per indentation level.
pub struct KeyValuePrinter {
    indent_size: usize,
    current: usize,
    items: Vec<Item>,
    widths: HashMap<usize, usize>,
}

impl KeyValuePrinter {
    pub fn new(indent_size: usize) -> Self {
        Self {
            indent_size,
            current: 0,
            items: Vec::new(),
            widths: HashMap::new(),
        }
    }

    pub fn indent(&mut self) {
        self.current += 1;
    }

    pub fn unindent(&mut self) {
        self.current = self.current.saturating_sub(1);
    }

    pub fn line(&mut self, key: &str, value: impl Display) {
        self.push(key, Some(value.to_string()));
    }

    /// A key printed on its own; it does not widen the column.
    pub fn label(&mut self, key: &str) {
        self.push(key, None);
    }

    fn push(&mut self, key: &str, value: Option<String>) {
        if value.is_some() {
            let width = self.widths.entry(self.current).or_default();
            *width = (*width).max(key.chars().count());
        }
        self.items.push(Item {
            indent: self.current,
            key: key.to_string(),
            value,
        });
    }

    /// Write everything collected so far and reset the printer.
    pub fn write_to(&mut self, w: &mut impl Write) -> io::Result<()> {
        for item in self.items.drain(..) {
            let pad = " ".repeat(item.indent * self.indent_size);
            match item.value {
                None => writeln!(w, "{pad}{}", item.key)?,
                Some(value) => {
                    let width = self.widths.get(&item.indent).copied().unwrap_or(0);
                    writeln!(w, "{pad}{:<width$} : {value}", item.key)?;
                }
            }
        }
        self.current = 0;
        self.widths.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligns_keys_per_level() {
        let mut p = KeyValuePrinter::new(2);
        p.line("Name", "agent");
        p.line("Start Type", "manual");
        p.label("Recovery Actions");
        p.indent();
        p.line("Exit Code", 1);
        p.line("Action", "restart");
        p.unindent();

        let mut out = Vec::new();
        p.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "Name       : agent\n\
             Start Type : manual\n\
             Recovery Actions\n  \
             Exit Code : 1\n  \
             Action    : restart\n"
        );
    }

    #[test]
    fn test_write_resets_state() {
        let mut p = KeyValuePrinter::new(4);
        p.line("A very long key", 1);
        p.indent();
        let mut out = Vec::new();
        p.write_to(&mut out).unwrap();

        p.line("B", 2);
        let mut out = Vec::new();
        p.write_to(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "B : 2\n");
    }
}
