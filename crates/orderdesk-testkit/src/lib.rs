// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use orderdesk_app::{
    DocumentPayload, DraftStorage, GeneratedDocument, Lookup, LookupError, PartyHit, PartyTarget,
    PriceQuote, PricingKey, ProductRecord, ProductSearch, UnitOption,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use time::Date;
use time::macros::date;

pub const FIXTURE_ORIGIN: &str = "http://localhost:8000";

/// Kinds of backend call, used to script failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Ping,
    Customer,
    ShipTo,
    Maker,
    Product,
    Units,
    Price,
    Search,
    ProductSearch,
    Document,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Ping,
    Customer(String),
    ShipTo(String),
    Maker(String),
    Product(String),
    Units(String),
    Price(PricingKey),
    Search(PartyTarget, String),
    ProductSearch(ProductSearch),
    Document(DocumentPayload),
}

impl Call {
    pub const fn kind(&self) -> CallKind {
        match self {
            Self::Ping => CallKind::Ping,
            Self::Customer(_) => CallKind::Customer,
            Self::ShipTo(_) => CallKind::ShipTo,
            Self::Maker(_) => CallKind::Maker,
            Self::Product(_) => CallKind::Product,
            Self::Units(_) => CallKind::Units,
            Self::Price(_) => CallKind::Price,
            Self::Search(..) => CallKind::Search,
            Self::ProductSearch(_) => CallKind::ProductSearch,
            Self::Document(_) => CallKind::Document,
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    customers: HashMap<String, String>,
    ship_tos: HashMap<String, String>,
    makers: HashMap<String, String>,
    products: HashMap<String, ProductRecord>,
    units: HashMap<String, Vec<UnitOption>>,
    prices: HashMap<PricingKey, PriceQuote>,
    document: Option<GeneratedDocument>,
    failing: HashSet<CallKind>,
    calls: Vec<Call>,
}

/// Scripted in-process backend. Every call is recorded; unscripted codes
/// behave like the real backend's "not registered" replies.
#[derive(Debug, Default)]
pub struct FakeBackend {
    script: Mutex<Script>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Customer 123, ship-to 9, and three products with unit and price data.
    pub fn catalog() -> Self {
        let backend = Self::new();
        backend.add_customer("123", "ACME");
        backend.add_ship_to("9", "North Clinic");
        backend.add_maker("M1", "Terumo");
        backend.add_product(product("534687", "Syringe 10mL", "M1", "Terumo"));
        backend.add_product(product("479238", "Gauze 5cm", "M1", "Terumo"));
        backend.add_product(product("50362", "Glove M", "M2", "Nipro"));
        backend.set_units("534687", vec![UnitOption::new("箱", "10入", "A")]);
        backend.set_units(
            "479238",
            vec![
                UnitOption::new("箱", "50入", "A"),
                UnitOption::new("個", "", "B"),
            ],
        );
        backend.set_units("50362", vec![UnitOption::new("袋", "100入", "C")]);
        backend.set_price(pricing_key("534687", "A"), quote(1200, 1000, 700));
        backend.set_price(pricing_key("479238", "A"), quote(900, 800, 500));
        backend.set_price(pricing_key("479238", "B"), quote(30, 20, 10));
        backend.set_price(pricing_key("50362", "C"), quote(450, 400, 250));
        backend
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_customer(&self, code: &str, name: &str) {
        self.script()
            .customers
            .insert(code.to_owned(), name.to_owned());
    }

    pub fn add_ship_to(&self, code: &str, name: &str) {
        self.script()
            .ship_tos
            .insert(code.to_owned(), name.to_owned());
    }

    pub fn add_maker(&self, code: &str, name: &str) {
        self.script().makers.insert(code.to_owned(), name.to_owned());
    }

    pub fn add_product(&self, record: ProductRecord) {
        self.script()
            .products
            .insert(record.product_code.clone(), record);
    }

    pub fn set_units(&self, product_code: &str, options: Vec<UnitOption>) {
        self.script()
            .units
            .insert(product_code.to_owned(), options);
    }

    pub fn set_price(&self, key: PricingKey, quote: PriceQuote) {
        self.script().prices.insert(key, quote);
    }

    pub fn set_document(&self, document: GeneratedDocument) {
        self.script().document = Some(document);
    }

    pub fn fail(&self, kind: CallKind) {
        self.script().failing.insert(kind);
    }

    pub fn recover(&self, kind: CallKind) {
        self.script().failing.remove(&kind);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script().calls.clone()
    }

    pub fn calls_of(&self, kind: CallKind) -> Vec<Call> {
        self.script()
            .calls
            .iter()
            .filter(|call| call.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.calls_of(kind).len()
    }

    pub fn clear_calls(&self) {
        self.script().calls.clear();
    }

    fn record(&self, call: Call) -> Result<MutexGuard<'_, Script>, LookupError> {
        let kind = call.kind();
        let mut script = self.script();
        script.calls.push(call);
        if script.failing.contains(&kind) {
            return Err(LookupError::Status {
                method: "GET",
                path: format!("/{kind:?}").to_lowercase(),
                status: 503,
                body: "scripted failure".to_owned(),
            });
        }
        Ok(script)
    }
}

impl Lookup for FakeBackend {
    fn ping(&self) -> Result<(), LookupError> {
        self.record(Call::Ping).map(|_| ())
    }

    fn customer_name(&self, code: &str) -> Result<Option<String>, LookupError> {
        let script = self.record(Call::Customer(code.to_owned()))?;
        Ok(script.customers.get(code).cloned())
    }

    fn ship_to_name(&self, code: &str) -> Result<Option<String>, LookupError> {
        let script = self.record(Call::ShipTo(code.to_owned()))?;
        Ok(script.ship_tos.get(code).cloned())
    }

    fn maker_name(&self, code: &str) -> Result<Option<String>, LookupError> {
        let script = self.record(Call::Maker(code.to_owned()))?;
        Ok(script.makers.get(code).cloned())
    }

    fn product(&self, code: &str) -> Result<ProductRecord, LookupError> {
        let script = self.record(Call::Product(code.to_owned()))?;
        Ok(script
            .products
            .get(code)
            .cloned()
            .unwrap_or_else(|| ProductRecord {
                product_code: code.to_owned(),
                ..ProductRecord::default()
            }))
    }

    fn unit_options(&self, product_code: &str) -> Result<Vec<UnitOption>, LookupError> {
        let script = self.record(Call::Units(product_code.to_owned()))?;
        Ok(script.units.get(product_code).cloned().unwrap_or_default())
    }

    fn resolve_price(&self, key: &PricingKey) -> Result<PriceQuote, LookupError> {
        let script = self.record(Call::Price(key.clone()))?;
        Ok(script.prices.get(key).cloned().unwrap_or_default())
    }

    fn search_parties(
        &self,
        target: PartyTarget,
        query: &str,
    ) -> Result<Vec<PartyHit>, LookupError> {
        let script = self.record(Call::Search(target, query.to_owned()))?;
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let table = match target {
            PartyTarget::Customer => &script.customers,
            PartyTarget::ShipTo => &script.ship_tos,
            PartyTarget::Maker => &script.makers,
        };
        let sorted: BTreeMap<_, _> = table.iter().collect();
        Ok(sorted
            .into_iter()
            .filter(|(_, name)| name.contains(query))
            .map(|(code, name)| PartyHit {
                code: code.clone(),
                name: name.clone(),
            })
            .collect())
    }

    fn search_products(&self, query: &ProductSearch) -> Result<Vec<ProductRecord>, LookupError> {
        let script = self.record(Call::ProductSearch(query.clone()))?;
        let mut hits: Vec<ProductRecord> = script
            .products
            .values()
            .filter(|record| {
                query.maker_code.is_empty()
                    || record.maker_code.as_deref() == Some(query.maker_code.as_str())
            })
            .filter(|record| {
                query.product_name.is_empty()
                    || record
                        .product_name
                        .as_deref()
                        .is_some_and(|name| name.contains(&query.product_name))
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.product_code.cmp(&b.product_code));
        hits.truncate(query.limit as usize);
        Ok(hits)
    }

    fn generate_document(
        &self,
        payload: &DocumentPayload,
    ) -> Result<GeneratedDocument, LookupError> {
        let script = self.record(Call::Document(payload.clone()))?;
        Ok(script.document.clone().unwrap_or_else(|| GeneratedDocument {
            filename: None,
            bytes: b"%PDF-1.4\n".to_vec(),
        }))
    }
}

/// Session storage kept in memory, with a log of every write and a switch to
/// make writes fail.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
    writes: Vec<(String, String)>,
    fail_writes: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: &str, value: &str) -> Self {
        self.entries.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn writes(&self) -> &[(String, String)] {
        &self.writes
    }

    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl DraftStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes {
            bail!("session storage quota exceeded");
        }
        self.entries.insert(key.to_owned(), value.to_owned());
        self.writes.push((key.to_owned(), value.to_owned()));
        Ok(())
    }
}

pub fn product(code: &str, name: &str, maker_code: &str, maker_name: &str) -> ProductRecord {
    ProductRecord {
        product_code: code.to_owned(),
        product_name: Some(name.to_owned()),
        part_number: Some(format!("P-{code}")),
        spec: Some("std".to_owned()),
        maker_code: Some(maker_code.to_owned()),
        maker_name: Some(maker_name.to_owned()),
        supplier_code: Some("S01".to_owned()),
        supplier_name: Some("Central Supply".to_owned()),
    }
}

/// Key for the catalog customer 123 and ship-to 9.
pub fn pricing_key(product_code: &str, unit_rank: &str) -> PricingKey {
    PricingKey {
        customer_code: "123".to_owned(),
        ship_to_code: "9".to_owned(),
        product_code: product_code.to_owned(),
        unit_rank: unit_rank.to_owned(),
    }
}

pub fn quote(list_price: i64, sales_price: i64, purchase_price: i64) -> PriceQuote {
    PriceQuote {
        list_price,
        sales_price,
        purchase_price,
        source: Some("得意先単価".to_owned()),
        supplier_code: None,
    }
}

pub fn fixture_date() -> Date {
    date!(2026 - 02 - 19)
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("orderdesk.db");
    Ok((dir, db_path))
}
