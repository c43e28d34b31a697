// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use orderdesk_app::{
    Lookup, LookupError, PriceQuote, PricingKey, ProductRecord, RowId, TicketId, UnitOption,
};

/// A lookup the session has already committed to. Issuing a ticket applies
/// every guard; completing it applies the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    CustomerName { code: String },
    ShipToName { code: String },
    MakerName { row: RowId, code: String },
    Product { row: RowId, code: String },
    Units {
        row: RowId,
        product_code: String,
        preferred: String,
    },
    Price { row: RowId, key: PricingKey },
}

impl Request {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::CustomerName { .. } => "customer",
            Self::ShipToName { .. } => "ship-to",
            Self::MakerName { .. } => "maker",
            Self::Product { .. } => "product",
            Self::Units { .. } => "units",
            Self::Price { .. } => "price",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Name(Option<String>),
    Product(ProductRecord),
    Units(Vec<UnitOption>),
    Price(PriceQuote),
}

/// Where a failed lookup is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorRoute {
    /// The user triggered it directly; the error line shows the failure.
    Surface,
    /// Chained, bulk, or best-effort work; failures are only logged.
    Log,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub id: TicketId,
    pub route: ErrorRoute,
    pub request: Request,
}

/// Runs one request against the backend. Safe to call from any thread.
pub fn execute(lookup: &dyn Lookup, request: &Request) -> Result<Reply, LookupError> {
    match request {
        Request::CustomerName { code } => lookup.customer_name(code).map(Reply::Name),
        Request::ShipToName { code } => lookup.ship_to_name(code).map(Reply::Name),
        Request::MakerName { code, .. } => lookup.maker_name(code).map(Reply::Name),
        Request::Product { code, .. } => lookup.product(code).map(Reply::Product),
        Request::Units { product_code, .. } => lookup.unit_options(product_code).map(Reply::Units),
        Request::Price { key, .. } => lookup.resolve_price(key).map(Reply::Price),
    }
}
