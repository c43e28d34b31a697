// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::Deserialize;
use thiserror::Error;

use crate::forms::DocumentPayload;
use crate::model::{PriceQuote, PricingKey, ProductRecord, UnitOption};
use crate::wire;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("cannot reach backend at {url}: {message} -- check [backend].base_url and that the server is running")]
    Unreachable { url: String, message: String },
    #[error("{method} {path} failed: {status}\n{body}")]
    Status {
        method: &'static str,
        path: String,
        status: u16,
        body: String,
    },
    #[error("decode {what}: {message}")]
    Decode { what: String, message: String },
    #[error("invalid lookup request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyTarget {
    Customer,
    ShipTo,
    Maker,
}

impl PartyTarget {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::ShipTo => "ship-to",
            Self::Maker => "maker",
        }
    }
}

/// One row of a customer, ship-to, or maker search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PartyHit {
    #[serde(
        default,
        alias = "tcode",
        alias = "jcode",
        alias = "maker_cd",
        deserialize_with = "wire::text"
    )]
    pub code: String,
    #[serde(
        default,
        alias = "customer_name",
        alias = "shipto_name",
        alias = "maker_name",
        deserialize_with = "wire::text"
    )]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSearch {
    pub maker_code: String,
    pub maker_name: String,
    pub part_number: String,
    pub product_name: String,
    pub spec: String,
    pub limit: u32,
}

impl Default for ProductSearch {
    fn default() -> Self {
        Self {
            maker_code: String::new(),
            maker_name: String::new(),
            part_number: String::new(),
            product_name: String::new(),
            spec: String::new(),
            limit: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
    /// From `Content-Disposition`, when the backend sent one.
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// Backend master-data lookups. `None` from a name lookup means the code is
/// not registered, which is a successful outcome.
pub trait Lookup {
    fn ping(&self) -> Result<(), LookupError>;
    fn customer_name(&self, code: &str) -> Result<Option<String>, LookupError>;
    fn ship_to_name(&self, code: &str) -> Result<Option<String>, LookupError>;
    fn maker_name(&self, code: &str) -> Result<Option<String>, LookupError>;
    fn product(&self, code: &str) -> Result<ProductRecord, LookupError>;
    fn unit_options(&self, product_code: &str) -> Result<Vec<UnitOption>, LookupError>;
    fn resolve_price(&self, key: &PricingKey) -> Result<PriceQuote, LookupError>;
    fn search_parties(&self, target: PartyTarget, query: &str)
    -> Result<Vec<PartyHit>, LookupError>;
    fn search_products(&self, query: &ProductSearch) -> Result<Vec<ProductRecord>, LookupError>;
    fn generate_document(&self, payload: &DocumentPayload)
    -> Result<GeneratedDocument, LookupError>;
}
