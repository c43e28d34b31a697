// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::ids::RowId;
use crate::wire;

/// Committed in place of a name when the master record does not exist.
pub const NOT_REGISTERED: &str = "（未登録）";
/// Price source written when the backend reply carries no label.
pub const UNSET_PRICE_SOURCE: &str = "未設定";

pub const ARRANGEMENT_OPTIONS: [&str; 6] = [
    "有効在庫引当",
    "全数発注(※)",
    "在庫出荷済(緊急品)",
    "発注入荷済(短貸含)",
    "貸出品 補充要",
    "貸出品 補充不要(済)",
];

pub fn is_valid_arrangement(value: &str) -> bool {
    value.is_empty() || ARRANGEMENT_OPTIONS.contains(&value)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderHeader {
    pub issue_date: String,
    pub customer_code: String,
    pub customer_name: String,
    pub ship_to_code: String,
    pub ship_to_name: String,
}

impl OrderHeader {
    /// Returns true when the code actually changed; the derived name is
    /// cleared until the next name resolution commits.
    pub fn set_customer_code(&mut self, code: &str) -> bool {
        let code = code.trim();
        if self.customer_code == code {
            return false;
        }
        self.customer_code = code.to_owned();
        self.customer_name.clear();
        true
    }

    pub fn set_ship_to_code(&mut self, code: &str) -> bool {
        let code = code.trim();
        if self.ship_to_code == code {
            return false;
        }
        self.ship_to_code = code.to_owned();
        self.ship_to_name.clear();
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOption {
    #[serde(
        default,
        alias = "単位名",
        alias = "単位.単位名",
        deserialize_with = "wire::text"
    )]
    pub unit_name: String,
    #[serde(
        default,
        rename = "irisu_name",
        alias = "入数名",
        alias = "入数.入数名",
        deserialize_with = "wire::text"
    )]
    pub multiplier_name: String,
    #[serde(
        default,
        rename = "irisu_rank",
        alias = "入数ランク",
        alias = "入数.入数ランク",
        deserialize_with = "wire::text"
    )]
    pub rank: String,
}

impl UnitOption {
    pub fn new(unit_name: &str, multiplier_name: &str, rank: &str) -> Self {
        Self {
            unit_name: unit_name.to_owned(),
            multiplier_name: multiplier_name.to_owned(),
            rank: rank.to_owned(),
        }
    }
}

/// Preferred name wins; otherwise a lone non-blank option is auto-selected.
pub fn choose_unit<'a>(options: &'a [UnitOption], preferred: &str) -> Option<&'a UnitOption> {
    let want = preferred.trim();
    if !want.is_empty()
        && let Some(found) = options.iter().find(|option| option.unit_name == want)
    {
        return Some(found);
    }

    let mut actual = options
        .iter()
        .filter(|option| !option.unit_name.trim().is_empty());
    match (actual.next(), actual.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

/// Identity a price reply is valid for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PricingKey {
    #[serde(rename = "tcode")]
    pub customer_code: String,
    #[serde(rename = "jcode")]
    pub ship_to_code: String,
    #[serde(rename = "scode")]
    pub product_code: String,
    #[serde(rename = "irank")]
    pub unit_rank: String,
}

impl PricingKey {
    /// `None` when any component is blank.
    pub fn from_parts(
        customer_code: &str,
        ship_to_code: &str,
        product_code: &str,
        unit_rank: &str,
    ) -> Option<Self> {
        let parts = [customer_code, ship_to_code, product_code, unit_rank].map(str::trim);
        if parts.iter().any(|part| part.is_empty()) {
            return None;
        }
        let [customer_code, ship_to_code, product_code, unit_rank] = parts;
        Some(Self {
            customer_code: customer_code.to_owned(),
            ship_to_code: ship_to_code.to_owned(),
            product_code: product_code.to_owned(),
            unit_rank: unit_rank.to_owned(),
        })
    }

    pub fn joined(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.customer_code, self.ship_to_code, self.product_code, self.unit_rank
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PriceQuote {
    #[serde(default, rename = "teika", deserialize_with = "wire::number")]
    pub list_price: i64,
    #[serde(default, deserialize_with = "wire::number")]
    pub sales_price: i64,
    #[serde(default, deserialize_with = "wire::number")]
    pub purchase_price: i64,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub supplier_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProductRecord {
    #[serde(default, rename = "product_cd", deserialize_with = "wire::text")]
    pub product_code: String,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub product_name: Option<String>,
    #[serde(default, rename = "maker_part_no", deserialize_with = "wire::optional_text")]
    pub part_number: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub spec: Option<String>,
    #[serde(default, rename = "maker_cd", deserialize_with = "wire::optional_text")]
    pub maker_code: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub maker_name: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub supplier_code: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub supplier_name: Option<String>,
}

/// Per-row duplicate-request guard for price resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceGuard {
    pub in_flight: Option<PricingKey>,
    pub settled: Option<PricingKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub id: RowId,
    pub maker_code: String,
    pub maker_name: String,
    pub product_code: String,
    pub product_name: String,
    pub part_number: String,
    pub spec: String,
    pub quantity: i64,
    pub unit_name: String,
    pub unit_multiplier_name: String,
    pub unit_rank: String,
    pub unit_options: Vec<UnitOption>,
    pub list_price: i64,
    pub sales_unit_price: i64,
    pub sales_amount: i64,
    pub purchase_unit_price: i64,
    pub purchase_amount: i64,
    pub price_source: String,
    pub supplier_code: String,
    pub supplier_name: String,
    pub arrangement: String,
    pub delivery_place: String,
    pub line_note: String,
    pub price_guard: PriceGuard,
}

impl OrderLine {
    pub fn blank(id: RowId) -> Self {
        Self {
            id,
            maker_code: String::new(),
            maker_name: String::new(),
            product_code: String::new(),
            product_name: String::new(),
            part_number: String::new(),
            spec: String::new(),
            quantity: 0,
            unit_name: String::new(),
            unit_multiplier_name: String::new(),
            unit_rank: String::new(),
            unit_options: Vec::new(),
            list_price: 0,
            sales_unit_price: 0,
            sales_amount: 0,
            purchase_unit_price: 0,
            purchase_amount: 0,
            price_source: String::new(),
            supplier_code: String::new(),
            supplier_name: String::new(),
            arrangement: String::new(),
            delivery_place: String::new(),
            line_note: String::new(),
            price_guard: PriceGuard::default(),
        }
    }

    pub fn recompute_amounts(&mut self) {
        self.sales_amount = self.sales_unit_price.saturating_mul(self.quantity);
        self.purchase_amount = self.purchase_unit_price.saturating_mul(self.quantity);
    }

    pub fn set_quantity(&mut self, quantity: i64) {
        self.quantity = quantity.max(0);
        self.recompute_amounts();
    }

    pub fn set_sales_unit_price(&mut self, price: i64) {
        self.sales_unit_price = price;
        self.recompute_amounts();
    }

    pub fn set_purchase_unit_price(&mut self, price: i64) {
        self.purchase_unit_price = price;
        self.recompute_amounts();
    }

    /// Zeroes every server-derived price and forgets the settled key so the
    /// next resolution with a complete key is a live request.
    pub fn reset_prices(&mut self) {
        self.list_price = 0;
        self.sales_unit_price = 0;
        self.purchase_unit_price = 0;
        self.price_source.clear();
        self.price_guard.settled = None;
        self.recompute_amounts();
    }

    pub fn clear_units(&mut self) {
        self.unit_options.clear();
        self.unit_name.clear();
        self.unit_multiplier_name.clear();
        self.unit_rank.clear();
    }

    /// Units are about to be re-fetched. The unit name stays as the
    /// preference; the rank must come from the new option list.
    pub fn forget_unit_options(&mut self) {
        self.unit_options.clear();
        self.unit_multiplier_name.clear();
        self.unit_rank.clear();
    }

    /// Blank product code: everything the product drove is cleared.
    pub fn reset_product(&mut self) {
        self.product_name.clear();
        self.part_number.clear();
        self.spec.clear();
        self.clear_units();
        self.reset_prices();
    }

    pub fn apply_product(&mut self, record: &ProductRecord) {
        if self.maker_code.trim().is_empty() {
            self.maker_code = record.maker_code.clone().unwrap_or_default();
        }
        if self.maker_name.trim().is_empty() {
            self.maker_name = record.maker_name.clone().unwrap_or_default();
        }
        self.product_name = record
            .product_name
            .clone()
            .unwrap_or_else(|| NOT_REGISTERED.to_owned());
        self.part_number = record.part_number.clone().unwrap_or_default();
        self.spec = record.spec.clone().unwrap_or_default();
        self.supplier_code = record.supplier_code.clone().unwrap_or_default();
        self.supplier_name = record.supplier_name.clone().unwrap_or_default();
    }

    /// Repopulates the selectable list and applies the selection policy.
    pub fn apply_unit_options(&mut self, options: Vec<UnitOption>, preferred: &str) {
        self.clear_units();
        self.unit_options = options
            .into_iter()
            .filter(|option| !option.unit_name.trim().is_empty())
            .collect();
        if let Some(chosen) = choose_unit(&self.unit_options, preferred).cloned() {
            self.unit_name = chosen.unit_name;
            self.unit_multiplier_name = chosen.multiplier_name;
            self.unit_rank = chosen.rank;
        }
    }

    /// Manual unit change; multiplier and rank follow the chosen option
    /// without a request.
    pub fn select_unit(&mut self, unit_name: &str) -> Result<()> {
        if unit_name.is_empty() {
            self.unit_name.clear();
            self.unit_multiplier_name.clear();
            self.unit_rank.clear();
            return Ok(());
        }

        let Some(option) = self
            .unit_options
            .iter()
            .find(|option| option.unit_name == unit_name)
            .cloned()
        else {
            bail!(
                "unit {unit_name:?} is not offered for product {:?} -- pick one of the listed units",
                self.product_code
            );
        };
        self.unit_name = option.unit_name;
        self.unit_multiplier_name = option.multiplier_name;
        self.unit_rank = option.rank;
        Ok(())
    }

    pub fn apply_quote(&mut self, quote: &PriceQuote) {
        self.list_price = quote.list_price;
        self.sales_unit_price = quote.sales_price;
        self.purchase_unit_price = quote.purchase_price;
        self.price_source = quote
            .source
            .clone()
            .unwrap_or_else(|| UNSET_PRICE_SOURCE.to_owned());
        if let Some(code) = &quote.supplier_code
            && !code.trim().is_empty()
        {
            self.supplier_code = code.clone();
        }
        self.recompute_amounts();
    }

    pub fn pricing_key(&self, header: &OrderHeader) -> Option<PricingKey> {
        PricingKey::from_parts(
            &header.customer_code,
            &header.ship_to_code,
            &self.product_code,
            &self.unit_rank,
        )
    }

    pub fn has_priceable_unit(&self) -> bool {
        !self.product_code.trim().is_empty() && !self.unit_rank.trim().is_empty()
    }
}
