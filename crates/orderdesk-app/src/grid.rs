// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};

use crate::draft::{DraftState, LineRecord};
use crate::ids::RowId;
use crate::model::{OrderHeader, OrderLine};

/// Ordered line rows plus the single order header.
///
/// Row ids come from a counter that only ever grows, so clearing and
/// rebuilding the grid never hands out an id a picker window may still hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    header: OrderHeader,
    lines: Vec<OrderLine>,
    last_row: i64,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(&self) -> &OrderHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut OrderHeader {
        &mut self.header
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn row_ids(&self) -> Vec<RowId> {
        self.lines.iter().map(|line| line.id).collect()
    }

    pub fn append(&mut self, prefill: Option<&LineRecord>) -> RowId {
        self.last_row += 1;
        let id = RowId::new(self.last_row);
        let line = match prefill {
            Some(record) => line_from_record(id, record),
            None => OrderLine::blank(id),
        };
        self.lines.push(line);
        id
    }

    pub fn line(&self, id: RowId) -> Option<&OrderLine> {
        self.lines.iter().find(|line| line.id == id)
    }

    pub fn line_mut(&mut self, id: RowId) -> Option<&mut OrderLine> {
        self.lines.iter_mut().find(|line| line.id == id)
    }

    /// Edits address rows the caller created; an unknown id is a wiring bug.
    pub fn require_line_mut(&mut self, id: RowId) -> Result<&mut OrderLine> {
        self.line_mut(id)
            .ok_or_else(|| anyhow!("row {id} does not exist in the order grid"))
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn snapshot(&self) -> DraftState {
        DraftState {
            issue_date: self.header.issue_date.clone(),
            customer_code: self.header.customer_code.clone(),
            customer_name: self.header.customer_name.clone(),
            ship_to_code: self.header.ship_to_code.clone(),
            ship_to_name: self.header.ship_to_name.clone(),
            rows: self.lines.iter().map(record_from_line).collect(),
        }
    }

    /// Replaces header and rows wholesale, one appended row per record.
    pub fn rebuild(&mut self, state: &DraftState) -> Vec<RowId> {
        self.header = OrderHeader {
            issue_date: state.issue_date.clone(),
            customer_code: state.customer_code.clone(),
            customer_name: state.customer_name.clone(),
            ship_to_code: state.ship_to_code.clone(),
            ship_to_name: state.ship_to_name.clone(),
        };
        self.clear();
        state
            .rows
            .iter()
            .map(|record| self.append(Some(record)))
            .collect()
    }
}

fn line_from_record(id: RowId, record: &LineRecord) -> OrderLine {
    let mut line = OrderLine {
        maker_code: record.maker_code.clone(),
        maker_name: record.maker_name.clone(),
        product_code: record.product_code.clone(),
        product_name: record.product_name.clone(),
        part_number: record.part_number.clone(),
        spec: record.spec.clone(),
        quantity: record.quantity.max(0),
        unit_name: record.unit_name.clone(),
        unit_multiplier_name: record.unit_multiplier_name.clone(),
        unit_rank: record.unit_rank.clone(),
        list_price: record.list_price,
        sales_unit_price: record.sales_unit_price,
        purchase_unit_price: record.purchase_unit_price,
        price_source: record.price_source.clone(),
        supplier_code: record.supplier_code.clone(),
        supplier_name: record.supplier_name.clone(),
        arrangement: record.arrangement.clone(),
        delivery_place: record.delivery_place.clone(),
        line_note: record.line_note.clone(),
        ..OrderLine::blank(id)
    };
    line.recompute_amounts();
    line
}

fn record_from_line(line: &OrderLine) -> LineRecord {
    LineRecord {
        maker_code: line.maker_code.clone(),
        maker_name: line.maker_name.clone(),
        product_code: line.product_code.clone(),
        product_name: line.product_name.clone(),
        part_number: line.part_number.clone(),
        spec: line.spec.clone(),
        quantity: line.quantity,
        unit_name: line.unit_name.clone(),
        unit_multiplier_name: line.unit_multiplier_name.clone(),
        unit_rank: line.unit_rank.clone(),
        list_price: line.list_price,
        sales_unit_price: line.sales_unit_price,
        sales_amount: line.sales_amount,
        purchase_unit_price: line.purchase_unit_price,
        purchase_amount: line.purchase_amount,
        price_source: line.price_source.clone(),
        supplier_code: line.supplier_code.clone(),
        supplier_name: line.supplier_name.clone(),
        delivery_place: line.delivery_place.clone(),
        arrangement: line.arrangement.clone(),
        line_note: line.line_note.clone(),
    }
}
