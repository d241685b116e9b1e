/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::cell::RefCell;
use std::collections::HashMap;

/// Resolves `extern name lib library` declarations to absolute addresses.
/// The translator never opens libraries or maps memory itself; it only
/// calls out through this trait, mirroring how the real loader and the
/// page-protection change live entirely outside the pure translation step.
pub trait LibraryResolver {
    fn resolve(&self, library: &str, symbol: &str) -> Option<i64>;
}

/// Production resolver backed by a nested `library -> symbol -> address`
/// table, deserializable straight from the CLI's `--externs` JSON file.
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct MapResolver {
    table: HashMap<String, HashMap<String, String>>,
}

impl MapResolver {
    pub fn new(table: HashMap<String, HashMap<String, String>>) -> Self {
        Self { table }
    }
}

impl LibraryResolver for MapResolver {
    fn resolve(&self, library: &str, symbol: &str) -> Option<i64> {
        let addr_text = self.table.get(library)?.get(symbol)?;
        crate::numeric::parse_numeric_literal(addr_text)
            .or_else(|| i64::from_str_radix(addr_text.trim_start_matches("0x"), 16).ok())
    }
}

/// Test double that records every lookup it was asked to perform, mirroring
/// the production/mock split used for filesystem access elsewhere in this
/// codebase.
#[derive(Debug, Default)]
pub struct MockResolver {
    table: HashMap<(String, String), i64>,
    calls: RefCell<Vec<(String, String)>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbol(mut self, library: &str, symbol: &str, address: i64) -> Self {
        self.table
            .insert((library.to_string(), symbol.to_string()), address);
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.borrow().clone()
    }
}

impl LibraryResolver for MockResolver {
    fn resolve(&self, library: &str, symbol: &str) -> Option<i64> {
        self.calls
            .borrow_mut()
            .push((library.to_string(), symbol.to_string()));
        self.table
            .get(&(library.to_string(), symbol.to_string()))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_resolver_records_calls() {
        let resolver = MockResolver::new().with_symbol("kernel32", "ExitProcess", 0x1000);
        assert_eq!(resolver.resolve("kernel32", "ExitProcess"), Some(0x1000));
        assert_eq!(resolver.resolve("kernel32", "Missing"), None);
        assert_eq!(
            resolver.calls(),
            vec![
                ("kernel32".to_string(), "ExitProcess".to_string()),
                ("kernel32".to_string(), "Missing".to_string()),
            ]
        );
    }

    #[test]
    fn map_resolver_parses_hex_addresses() {
        let mut inner = HashMap::new();
        inner.insert("ExitProcess".to_string(), "1000h".to_string());
        let mut table = HashMap::new();
        table.insert("kernel32".to_string(), inner);
        let resolver = MapResolver::new(table);
        assert_eq!(resolver.resolve("kernel32", "ExitProcess"), Some(0x1000));
    }
}
