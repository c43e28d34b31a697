// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Session draft snapshot: header plus every line as plain scalars, stored
//! under a versioned key. Older keys are read as a fallback and rewritten
//! under the current key on the next save.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::wire;

pub const CURRENT_DRAFT_KEY: &str = "order_draft_v4";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftState {
    #[serde(default, deserialize_with = "wire::text")]
    pub issue_date: String,
    #[serde(default, rename = "tcode", deserialize_with = "wire::text")]
    pub customer_code: String,
    #[serde(default, rename = "tname", deserialize_with = "wire::text")]
    pub customer_name: String,
    #[serde(default, rename = "jcode", deserialize_with = "wire::text")]
    pub ship_to_code: String,
    #[serde(default, rename = "jname", deserialize_with = "wire::text")]
    pub ship_to_name: String,
    #[serde(default)]
    pub rows: Vec<LineRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRecord {
    #[serde(default, rename = "maker_cd", deserialize_with = "wire::text")]
    pub maker_code: String,
    #[serde(default, deserialize_with = "wire::text")]
    pub maker_name: String,
    #[serde(default, rename = "scode", deserialize_with = "wire::text")]
    pub product_code: String,
    #[serde(default, rename = "sname", deserialize_with = "wire::text")]
    pub product_name: String,
    #[serde(default, rename = "hinban", deserialize_with = "wire::text")]
    pub part_number: String,
    #[serde(default, rename = "kikaku", deserialize_with = "wire::text")]
    pub spec: String,
    #[serde(default, rename = "qty", deserialize_with = "wire::number")]
    pub quantity: i64,
    #[serde(default, deserialize_with = "wire::text")]
    pub unit_name: String,
    #[serde(default, rename = "irisuu_name", deserialize_with = "wire::text")]
    pub unit_multiplier_name: String,
    #[serde(default, rename = "irisu_rank", deserialize_with = "wire::text")]
    pub unit_rank: String,
    #[serde(default, rename = "teika", deserialize_with = "wire::number")]
    pub list_price: i64,
    #[serde(default, rename = "sales_price", deserialize_with = "wire::number")]
    pub sales_unit_price: i64,
    #[serde(default, deserialize_with = "wire::number")]
    pub sales_amount: i64,
    #[serde(default, rename = "purchase_price", deserialize_with = "wire::number")]
    pub purchase_unit_price: i64,
    #[serde(default, deserialize_with = "wire::number")]
    pub purchase_amount: i64,
    #[serde(default, rename = "price_src", deserialize_with = "wire::text")]
    pub price_source: String,
    #[serde(default, deserialize_with = "wire::text")]
    pub supplier_code: String,
    #[serde(default, rename = "sup_name", deserialize_with = "wire::text")]
    pub supplier_name: String,
    #[serde(default, rename = "nouhin", deserialize_with = "wire::text")]
    pub delivery_place: String,
    #[serde(default, rename = "tehai", deserialize_with = "wire::text")]
    pub arrangement: String,
    #[serde(default, rename = "biko", deserialize_with = "wire::text")]
    pub line_note: String,
}

impl DraftState {
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).context("encode draft snapshot")
    }
}

/// One readable schema generation. Tried newest-first.
#[derive(Debug, Clone, Copy)]
pub struct DraftVersion {
    pub key: &'static str,
    parse: fn(&str) -> Result<DraftState>,
}

impl DraftVersion {
    pub fn parse(&self, raw: &str) -> Result<DraftState> {
        (self.parse)(raw).with_context(|| format!("decode draft stored under {}", self.key))
    }
}

pub const DRAFT_VERSIONS: [DraftVersion; 4] = [
    DraftVersion {
        key: CURRENT_DRAFT_KEY,
        parse: parse_current,
    },
    DraftVersion {
        key: "order_draft_v3",
        parse: parse_by_field_name,
    },
    DraftVersion {
        key: "order_draft_v2",
        parse: parse_by_field_name,
    },
    DraftVersion {
        key: "order_draft_v1",
        parse: parse_by_field_name,
    },
];

fn parse_current(raw: &str) -> Result<DraftState> {
    Ok(serde_json::from_str(raw)?)
}

/// Older generations only promise that the same field names are present;
/// anything that is not an object or array where one is expected is dropped.
fn parse_by_field_name(raw: &str) -> Result<DraftState> {
    let mut value: Value = serde_json::from_str(raw)?;
    let Some(object) = value.as_object_mut() else {
        return Ok(DraftState::default());
    };
    let rows = match object.remove("rows") {
        Some(Value::Array(rows)) => rows
            .into_iter()
            .filter(Value::is_object)
            .collect::<Vec<_>>(),
        _ => Vec::new(),
    };
    object.insert("rows".to_owned(), Value::Array(rows));
    Ok(serde_json::from_value(value)?)
}

/// Session-scoped key/value storage the draft is written to.
pub trait DraftStorage {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&mut self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDraft {
    pub key: &'static str,
    pub state: DraftState,
}

/// Reads the newest key that is present. A present-but-corrupt entry ends the
/// search; older keys are only consulted when newer ones are absent.
pub fn load_draft(storage: &dyn DraftStorage) -> Result<Option<LoadedDraft>> {
    for version in DRAFT_VERSIONS {
        let Some(raw) = storage
            .read(version.key)
            .with_context(|| format!("read session storage key {}", version.key))?
        else {
            continue;
        };
        let state = version.parse(&raw)?;
        return Ok(Some(LoadedDraft {
            key: version.key,
            state,
        }));
    }
    Ok(None)
}

/// Fire-and-forget: failures are logged and otherwise ignored; the next
/// mutation writes again.
pub fn save_draft(storage: &mut dyn DraftStorage, state: &DraftState) -> bool {
    let result = state
        .encode()
        .and_then(|encoded| storage.write(CURRENT_DRAFT_KEY, &encoded));
    match result {
        Ok(()) => true,
        Err(error) => {
            tracing::warn!(error = %format!("{error:#}"), "draft save failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CURRENT_DRAFT_KEY, DRAFT_VERSIONS, DraftState, DraftStorage, load_draft};
    use anyhow::Result;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapStorage(HashMap<String, String>);

    impl DraftStorage for MapStorage {
        fn read(&self, key: &str) -> Result<Option<String>> {
            Ok(self.0.get(key).cloned())
        }

        fn write(&mut self, key: &str, value: &str) -> Result<()> {
            self.0.insert(key.to_owned(), value.to_owned());
            Ok(())
        }
    }

    #[test]
    fn versions_are_ordered_newest_first() {
        assert_eq!(DRAFT_VERSIONS[0].key, CURRENT_DRAFT_KEY);
        let keys: Vec<_> = DRAFT_VERSIONS.iter().map(|v| v.key).collect();
        assert_eq!(
            keys,
            vec![
                "order_draft_v4",
                "order_draft_v3",
                "order_draft_v2",
                "order_draft_v1"
            ]
        );
    }

    #[test]
    fn older_generation_maps_fields_by_name() -> Result<()> {
        let mut storage = MapStorage::default();
        storage.write(
            "order_draft_v2",
            r#"{"issue_date":"2026-01-05","tcode":123,"tname":"ACME","jcode":"9","rows":[{"scode":"534687","qty":"10","sales_price":"100"},"junk"]}"#,
        )?;

        let loaded = load_draft(&storage)?.expect("legacy draft should load");
        assert_eq!(loaded.key, "order_draft_v2");
        assert_eq!(loaded.state.customer_code, "123");
        assert_eq!(loaded.state.ship_to_code, "9");
        assert_eq!(loaded.state.rows.len(), 1);
        assert_eq!(loaded.state.rows[0].quantity, 10);
        assert_eq!(loaded.state.rows[0].sales_unit_price, 100);
        Ok(())
    }

    #[test]
    fn current_key_wins_over_older_keys() -> Result<()> {
        let mut storage = MapStorage::default();
        storage.write("order_draft_v1", r#"{"tcode":"old"}"#)?;
        storage.write(CURRENT_DRAFT_KEY, r#"{"tcode":"new","rows":[]}"#)?;

        let loaded = load_draft(&storage)?.expect("draft should load");
        assert_eq!(loaded.key, CURRENT_DRAFT_KEY);
        assert_eq!(loaded.state.customer_code, "new");
        Ok(())
    }

    #[test]
    fn corrupt_current_draft_is_an_error() -> Result<()> {
        let mut storage = MapStorage::default();
        storage.write(CURRENT_DRAFT_KEY, "{not json")?;
        storage.write("order_draft_v3", r#"{"tcode":"fallback"}"#)?;

        let error = load_draft(&storage).expect_err("corrupt draft should fail");
        assert!(error.to_string().contains(CURRENT_DRAFT_KEY));
        Ok(())
    }

    #[test]
    fn empty_storage_has_no_draft() -> Result<()> {
        assert!(load_draft(&MapStorage::default())?.is_none());
        Ok(())
    }

    #[test]
    fn encoding_is_stable() -> Result<()> {
        let state = DraftState {
            issue_date: "2026-02-01".to_owned(),
            customer_code: "123".to_owned(),
            ..DraftState::default()
        };
        assert_eq!(state.encode()?, state.encode()?);
        let decoded: DraftState = serde_json::from_str(&state.encode()?)?;
        assert_eq!(decoded, state);
        Ok(())
    }
}
