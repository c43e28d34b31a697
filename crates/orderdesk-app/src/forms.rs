// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use serde::Serialize;
use time::Date;
use time::macros::format_description;

use crate::model::{OrderHeader, OrderLine};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentHeader {
    pub order_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_cd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipto_cd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipto_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jcode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentItem {
    pub scode: String,
    pub irank: String,
    pub qty: i64,
    pub name: String,
    pub price: i64,
    pub sales_amount: i64,
    pub purchase_price: i64,
    pub purchase_amount: i64,
    pub spec: String,
    pub unit_name: String,
    pub irisu_name: String,
    pub supplier_code: String,
    pub supplier_name: String,
    pub delivery_place_name: String,
    pub line_note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentPayload {
    pub header: DocumentHeader,
    pub items: Vec<DocumentItem>,
}

impl DocumentPayload {
    pub fn fallback_filename(&self) -> String {
        format!("order_{}.pdf", self.header.order_date)
    }
}

pub fn iso_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// Lines without a product code or with zero quantity are left out; an
/// order with nothing left is rejected before any request is made.
pub fn build_document_payload(
    header: &OrderHeader,
    lines: &[OrderLine],
    today: Date,
) -> Result<DocumentPayload> {
    let issue_date = header.issue_date.trim();
    let order_date = if issue_date.is_empty() {
        iso_date(today)
    } else {
        if Date::parse(issue_date, format_description!("[year]-[month]-[day]")).is_err() {
            bail!("issue date {issue_date:?} must be YYYY-MM-DD -- fix the date and retry");
        }
        issue_date.to_owned()
    };

    let items: Vec<DocumentItem> = lines
        .iter()
        .filter(|line| !line.product_code.trim().is_empty() && line.quantity > 0)
        .map(|line| {
            let scode = line.product_code.trim().to_owned();
            let name = non_blank(&line.product_name).unwrap_or_else(|| scode.clone());
            DocumentItem {
                irank: line.unit_rank.trim().to_owned(),
                qty: line.quantity,
                name,
                price: line.sales_unit_price,
                sales_amount: line.sales_amount,
                purchase_price: line.purchase_unit_price,
                purchase_amount: line.purchase_amount,
                spec: line.spec.trim().to_owned(),
                unit_name: line.unit_name.trim().to_owned(),
                irisu_name: line.unit_multiplier_name.trim().to_owned(),
                supplier_code: line.supplier_code.trim().to_owned(),
                supplier_name: line.supplier_name.trim().to_owned(),
                delivery_place_name: line.delivery_place.trim().to_owned(),
                line_note: line.line_note.trim().to_owned(),
                scode,
            }
        })
        .collect();

    if items.is_empty() {
        bail!("no line items -- enter a product code and a quantity on at least one row");
    }

    let customer_code = non_blank(&header.customer_code);
    let ship_to_code = non_blank(&header.ship_to_code);
    Ok(DocumentPayload {
        header: DocumentHeader {
            order_date,
            customer_cd: customer_code.clone(),
            customer_name: non_blank(&header.customer_name),
            shipto_cd: ship_to_code.clone(),
            shipto_name: non_blank(&header.ship_to_name),
            tcode: customer_code,
            jcode: ship_to_code,
        },
        items,
    })
}
