// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Schema migrations for state files written by older gateway versions.
//!
//! Every migration function is idempotent: applying it twice in a row
//! produces the same result as applying it once, so a file that was already
//! migrated by a previous run (but whose `schema_version` field was somehow
//! left stale) is never double-transformed.

use crate::model::State;

/// Parse a raw JSON value into [`State`], running any migrations needed to
/// bring a legacy (or absent) `schema_version` up to [`crate::SCHEMA_VERSION`].
pub fn migrate(mut value: serde_json::Value) -> Result<State, serde_json::Error> {
    let version = value
        .get("schema_version")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);

    if version < 1 {
        value = migrate_v0_to_v1(value);
    }

    serde_json::from_value(value)
}

/// v0 (pre-versioned) state files had no `schema_version` field and stored
/// provider settings as a flat `{name: api_key}` map rather than the
/// structured `ProviderSetting` shape. Absent fields default sensibly via
/// `#[serde(default)]` on [`State`], so this migration's only required job
/// is stamping the version; it is kept as an explicit function (rather than
/// folded into `migrate`) so a v2 migration has a clear insertion point.
fn migrate_v0_to_v1(mut value: serde_json::Value) -> serde_json::Value {
    if let Some(obj) = value.as_object_mut() {
        obj.insert("schema_version".to_string(), serde_json::json!(1));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_stamps_version_on_legacy_file() {
        let raw = serde_json::json!({ "chats": {} });
        let state = migrate(raw).unwrap();
        assert_eq!(state.schema_version, 1);
    }

    #[test]
    fn migrate_is_idempotent() {
        let raw = serde_json::json!({ "chats": {}, "schema_version": 1 });
        let once = migrate(raw.clone()).unwrap();
        let twice = migrate(serde_json::to_value(&once).unwrap()).unwrap();
        assert_eq!(once.schema_version, twice.schema_version);
        assert_eq!(once.chats.len(), twice.chats.len());
    }

    #[test]
    fn migrate_v0_to_v1_is_idempotent_on_raw_value() {
        let raw = serde_json::json!({ "chats": {} });
        let once = migrate_v0_to_v1(raw);
        let twice = migrate_v0_to_v1(once.clone());
        assert_eq!(once, twice);
    }
}
