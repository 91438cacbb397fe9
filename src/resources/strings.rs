//! Localized string tables (`*.strings.yaml`).
//!
//! A table lives inside a `<lang>.lproj` bundle and must nest everything under
//! a top-level key equal to that language:
//!
//! ```yaml
//! fr:
//!   title: Bienvenue
//!   nav:
//!     home: Accueil
//! ```
//!
//! Nested mappings flatten into dotted keys (`nav.home`).

use super::ResourceError;
use serde_json::Value;
use std::collections::BTreeMap;

pub const STRINGS_SUFFIX: &str = ".strings.yaml";

/// Table consulted after the document-scoped one.
pub const SHARED_TABLE: &str = "Localizable.strings.yaml";

pub type StringsTable = BTreeMap<String, String>;

pub fn is_strings_table(name: &str) -> bool {
    name.ends_with(STRINGS_SUFFIX)
}

/// Decode a strings table for `lang`.
pub fn load_strings(name: &str, lang: &str, bytes: &[u8]) -> Result<StringsTable, ResourceError> {
    let value: Value = serde_yaml_ng::from_slice(bytes).map_err(|source| ResourceError::Yaml {
        name: name.to_string(),
        source,
    })?;
    let top = value
        .get(lang)
        .filter(|v| !v.is_null())
        .ok_or_else(|| ResourceError::MissingLanguageKey {
            name: name.to_string(),
            lang: lang.to_string(),
        })?;
    let mut table = StringsTable::new();
    flatten_into(top, "", &mut table);
    Ok(table)
}

fn flatten_into(value: &Value, prefix: &str, table: &mut StringsTable) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(child, &path, table);
            }
        }
        Value::String(text) if !prefix.is_empty() => {
            table.insert(prefix.to_string(), text.clone());
        }
        // Numbers, booleans and sequences are not translatable text.
        _ => {}
    }
}
