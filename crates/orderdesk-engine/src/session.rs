// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::sync::mpsc::Sender;

use anyhow::{Result, bail};
use orderdesk_app::{
    ARRANGEMENT_OPTIONS, DocumentPayload, DraftState, DraftStorage, Grid, InboundMessage,
    LineRecord, Lookup, LookupError, NOT_REGISTERED, PopupLauncher, PopupRequest, RowId,
    SelectionChannel, SelectionMessage, StatusBoard, StatusCommand, TicketId, WindowHost,
    build_document_payload, is_valid_arrangement, iso_date, load_draft, save_draft,
};
use serde::Deserialize;
use time::Date;

use crate::ticket::{ErrorRoute, Reply, Request, Ticket};

/// What to do with a price reply whose key no longer matches the row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingPolicy {
    /// Write the reply anyway. Requests are never cancelled.
    #[default]
    Commit,
    /// Drop the reply and request the row's current key instead.
    Revalidate,
}

impl PricingPolicy {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "commit" => Ok(Self::Commit),
            "revalidate" => Ok(Self::Revalidate),
            other => bail!(
                "unknown stale response policy {other:?} -- use \"commit\" or \"revalidate\""
            ),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Revalidate => "revalidate",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub channel: SelectionChannel,
    pub pricing: PricingPolicy,
    /// Rows added when a reload finds nothing to restore.
    pub seed_rows: Vec<LineRecord>,
}

impl SessionConfig {
    pub fn new(channel: SelectionChannel) -> Self {
        Self {
            channel,
            pricing: PricingPolicy::default(),
            seed_rows: Vec::new(),
        }
    }
}

pub fn demo_seed_rows() -> Vec<LineRecord> {
    [("534687", 10), ("479238", 5), ("50362", 5)]
        .into_iter()
        .map(|(product_code, quantity)| LineRecord {
            product_code: product_code.to_owned(),
            quantity,
            ..LineRecord::default()
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Restored {
    /// Storage key the draft came from; `None` when nothing was stored.
    pub key: Option<&'static str>,
    pub rows: usize,
    pub tickets: Vec<Ticket>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderField {
    Customer,
    ShipTo,
}

impl HeaderField {
    const fn label(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::ShipTo => "ship-to",
        }
    }
}

/// One order being entered: the grid, its status line, and the draft it is
/// mirrored to. Every operation runs to completion on the caller's thread;
/// lookups leave as tickets and come back through [`OrderSession::complete`].
pub struct OrderSession<S: DraftStorage> {
    grid: Grid,
    board: StatusBoard,
    storage: S,
    channel: SelectionChannel,
    pricing: PricingPolicy,
    seed_rows: Vec<LineRecord>,
    last_ticket: i64,
}

impl<S: DraftStorage> OrderSession<S> {
    pub fn new(storage: S, config: SessionConfig) -> Self {
        Self {
            grid: Grid::new(),
            board: StatusBoard::default(),
            storage,
            channel: config.channel,
            pricing: config.pricing,
            seed_rows: config.seed_rows,
            last_ticket: 0,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn status(&self) -> &StatusBoard {
        &self.board
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn persist(&mut self) -> bool {
        let snapshot = self.grid.snapshot();
        save_draft(&mut self.storage, &snapshot)
    }

    pub fn add_row(&mut self, prefill: Option<&LineRecord>) -> (RowId, Vec<Ticket>) {
        let id = self.grid.append(prefill);
        let mut tickets = Vec::new();
        if let Some(record) = prefill
            && !record.product_code.trim().is_empty()
        {
            tickets.extend(self.issue_units(id, ErrorRoute::Log, &record.unit_name));
        }
        self.persist();
        (id, tickets)
    }

    /// Replaces the grid with the stored draft and writes it straight back
    /// under the current key. Rows with a product code re-load their units.
    pub fn restore(&mut self) -> Result<Restored> {
        let Some(loaded) = load_draft(&self.storage)? else {
            return Ok(Restored::default());
        };
        let ids = self.grid.rebuild(&loaded.state);
        self.persist();

        let mut tickets = Vec::new();
        for id in &ids {
            let Some(line) = self.grid.line(*id) else {
                continue;
            };
            if line.product_code.trim().is_empty() {
                continue;
            }
            let preferred = line.unit_name.clone();
            tickets.extend(self.issue_units(*id, ErrorRoute::Log, &preferred));
        }

        tracing::info!(key = loaded.key, rows = ids.len(), "draft restored");
        Ok(Restored {
            key: Some(loaded.key),
            rows: ids.len(),
            tickets,
        })
    }

    /// Startup sequence: restore, default the issue date, re-resolve header
    /// names, and seed starter rows when nothing came back.
    pub fn reload(&mut self, today: Date) -> Vec<Ticket> {
        self.grid.rebuild(&DraftState::default());
        self.board = StatusBoard::default();

        let restored = match self.restore() {
            Ok(restored) => restored,
            Err(error) => {
                tracing::warn!(error = %format!("{error:#}"), "draft restore failed; starting fresh");
                Restored::default()
            }
        };
        let mut tickets = restored.tickets;

        if self.grid.header().issue_date.trim().is_empty() {
            self.grid.header_mut().issue_date = iso_date(today);
        }
        tickets.extend(self.issue_header_name(HeaderField::Customer, ErrorRoute::Log, false));
        tickets.extend(self.issue_header_name(HeaderField::ShipTo, ErrorRoute::Log, false));

        if restored.key.is_none() || self.grid.is_empty() {
            for record in self.seed_rows.clone() {
                let (_, seeded) = self.add_row(Some(&record));
                tickets.extend(seeded);
            }
        }
        self.persist();
        tickets
    }

    pub fn set_issue_date(&mut self, date: &str) {
        self.grid.header_mut().issue_date = date.trim().to_owned();
        self.persist();
    }

    pub fn set_customer_code(&mut self, code: &str) -> Vec<Ticket> {
        self.grid.header_mut().set_customer_code(code);
        self.persist();
        self.issue_header_name(HeaderField::Customer, ErrorRoute::Surface, true)
    }

    pub fn set_ship_to_code(&mut self, code: &str) -> Vec<Ticket> {
        self.grid.header_mut().set_ship_to_code(code);
        self.persist();
        self.issue_header_name(HeaderField::ShipTo, ErrorRoute::Surface, true)
    }

    pub fn set_maker_code(&mut self, row: RowId, code: &str) -> Result<Vec<Ticket>> {
        let code = code.trim().to_owned();
        let line = self.grid.require_line_mut(row)?;
        line.maker_code = code.clone();
        if code.is_empty() {
            line.maker_name.clear();
            self.persist();
            return Ok(Vec::new());
        }
        self.persist();
        self.begin(format!("resolving maker {code}"));
        Ok(vec![self.ticket(ErrorRoute::Surface, Request::MakerName { row, code })])
    }

    /// A blank code resets everything the product drove without a request.
    pub fn set_product_code(&mut self, row: RowId, code: &str) -> Result<Vec<Ticket>> {
        let code = code.trim().to_owned();
        let line = self.grid.require_line_mut(row)?;
        line.product_code = code.clone();
        if code.is_empty() {
            line.reset_product();
            self.persist();
            return Ok(Vec::new());
        }
        self.persist();
        self.begin(format!("resolving product {code}"));
        Ok(vec![self.ticket(ErrorRoute::Surface, Request::Product { row, code })])
    }

    pub fn set_quantity(&mut self, row: RowId, quantity: i64) -> Result<()> {
        self.grid.require_line_mut(row)?.set_quantity(quantity);
        self.persist();
        Ok(())
    }

    pub fn set_sales_price(&mut self, row: RowId, price: i64) -> Result<()> {
        self.grid.require_line_mut(row)?.set_sales_unit_price(price);
        self.persist();
        Ok(())
    }

    pub fn set_purchase_price(&mut self, row: RowId, price: i64) -> Result<()> {
        self.grid.require_line_mut(row)?.set_purchase_unit_price(price);
        self.persist();
        Ok(())
    }

    /// Multiplier and rank follow the chosen unit immediately; the changed
    /// pricing key then goes through the price guard.
    pub fn select_unit(&mut self, row: RowId, unit_name: &str) -> Result<Vec<Ticket>> {
        self.grid
            .require_line_mut(row)?
            .select_unit(unit_name.trim())?;
        self.persist();
        Ok(self
            .issue_price(row, ErrorRoute::Surface)
            .into_iter()
            .collect())
    }

    pub fn set_arrangement(&mut self, row: RowId, arrangement: &str) -> Result<()> {
        let arrangement = arrangement.trim();
        if !is_valid_arrangement(arrangement) {
            bail!(
                "arrangement {arrangement:?} is not offered -- pick one of: {}",
                ARRANGEMENT_OPTIONS.join(", ")
            );
        }
        self.grid.require_line_mut(row)?.arrangement = arrangement.to_owned();
        self.persist();
        Ok(())
    }

    pub fn set_delivery_place(&mut self, row: RowId, place: &str) -> Result<()> {
        self.grid.require_line_mut(row)?.delivery_place = place.to_owned();
        self.persist();
        Ok(())
    }

    pub fn set_line_note(&mut self, row: RowId, note: &str) -> Result<()> {
        self.grid.require_line_mut(row)?.line_note = note.to_owned();
        self.persist();
        Ok(())
    }

    /// One price resolution per row that has a product and a unit. No
    /// ordering between rows; each failure is logged on its own.
    pub fn refresh_all_prices(&mut self) -> Vec<Ticket> {
        let rows: Vec<RowId> = self
            .grid
            .lines()
            .iter()
            .filter(|line| line.has_priceable_unit())
            .map(|line| line.id)
            .collect();
        let tickets = rows
            .into_iter()
            .filter_map(|row| self.issue_price(row, ErrorRoute::Log))
            .collect();
        self.persist();
        tickets
    }

    /// Selection Channel entry point. Foreign, unknown, or untargeted
    /// messages leave the order untouched.
    pub fn deliver(&mut self, message: &InboundMessage) -> Vec<Ticket> {
        let selection = match self.channel.accept(message) {
            Ok(Some(selection)) => selection,
            Ok(None) => return Vec::new(),
            Err(error) => {
                tracing::warn!(error = %format!("{error:#}"), "malformed selection message");
                self.board
                    .dispatch(StatusCommand::SetError(format!("{error:#}")));
                return Vec::new();
            }
        };
        tracing::debug!(kind = selection.kind(), "selection received");
        self.apply_selection(selection)
    }

    fn apply_selection(&mut self, selection: SelectionMessage) -> Vec<Ticket> {
        let target = selection.target_row();
        match selection {
            SelectionMessage::CustomerSelected { customer } => {
                let header = self.grid.header_mut();
                header.customer_code = customer.code.trim().to_owned();
                header.customer_name = customer.name.unwrap_or_else(|| NOT_REGISTERED.to_owned());
                self.persist();
                self.issue_header_name(HeaderField::Customer, ErrorRoute::Log, true)
            }
            SelectionMessage::ShipToSelected { shipto } => {
                let header = self.grid.header_mut();
                header.ship_to_code = shipto.code.trim().to_owned();
                header.ship_to_name = shipto.name.unwrap_or_else(|| NOT_REGISTERED.to_owned());
                self.persist();
                self.issue_header_name(HeaderField::ShipTo, ErrorRoute::Log, true)
            }
            SelectionMessage::MakerSelected { row_id, maker } => {
                let Some(line) = target.and_then(|id| self.grid.line_mut(id)) else {
                    tracing::debug!(row_id = %row_id, "maker selection for a row that is gone");
                    return Vec::new();
                };
                if let Some(code) = maker.code {
                    line.maker_code = code.trim().to_owned();
                }
                if let Some(name) = maker.name {
                    line.maker_name = name;
                }
                self.persist();
                Vec::new()
            }
            SelectionMessage::ProductSelected { row_id, product } => {
                let Some(line) = target.and_then(|id| self.grid.line_mut(id)) else {
                    tracing::debug!(row_id = %row_id, "product selection for a row that is gone");
                    return Vec::new();
                };
                if let Some(code) = product.code {
                    line.product_code = code.trim().to_owned();
                }
                if let Some(name) = product.name {
                    line.product_name = name;
                }
                if let Some(part_number) = product.part_number {
                    line.part_number = part_number;
                }
                if let Some(spec) = product.spec {
                    line.spec = spec;
                }
                if line.maker_code.trim().is_empty()
                    && let Some(code) = product.maker_code
                {
                    line.maker_code = code;
                }
                if line.maker_name.trim().is_empty()
                    && let Some(name) = product.maker_name
                {
                    line.maker_name = name;
                }
                line.forget_unit_options();
                let row = line.id;
                let preferred = line.unit_name.clone();
                let tickets = self
                    .issue_units(row, ErrorRoute::Log, &preferred)
                    .into_iter()
                    .collect();
                self.persist();
                tickets
            }
        }
    }

    /// Saves first so the draft is current while the picker is open.
    pub fn open_picker(
        &mut self,
        launcher: &PopupLauncher,
        host: &mut dyn WindowHost,
        request: &PopupRequest,
        opener: Sender<InboundMessage>,
    ) -> Result<bool> {
        self.persist();
        launcher.launch(host, &mut self.board, request, opener)
    }

    pub fn document_payload(&self, today: Date) -> Result<DocumentPayload> {
        build_document_payload(self.grid.header(), self.grid.lines(), today)
    }

    pub fn issue_document(&mut self, lookup: &dyn Lookup, today: Date) -> Result<IssuedDocument> {
        self.begin("generating document".to_owned());
        let result = self.document_payload(today).and_then(|payload| {
            let document = lookup.generate_document(&payload)?;
            let filename = document
                .filename
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| payload.fallback_filename());
            Ok(IssuedDocument {
                filename,
                bytes: document.bytes,
            })
        });

        match result {
            Ok(document) => {
                tracing::info!(filename = %document.filename, bytes = document.bytes.len(), "document generated");
                self.board
                    .dispatch(StatusCommand::SetStatus("document generated".to_owned()));
                Ok(document)
            }
            Err(error) => {
                self.board
                    .dispatch(StatusCommand::SetError(format!("{error:#}")));
                self.board.dispatch(StatusCommand::SetStatus(
                    "document generation failed".to_owned(),
                ));
                Err(error)
            }
        }
    }

    /// Applies a finished lookup and returns whatever it leads to next.
    pub fn complete(
        &mut self,
        ticket: Ticket,
        outcome: Result<Reply, LookupError>,
    ) -> Result<Vec<Ticket>> {
        let Ticket { id, route, request } = ticket;
        if let Request::Price { row, key } = request {
            return self.complete_price(id, row, key, route, outcome);
        }

        let reply = match outcome {
            Ok(reply) => reply,
            Err(error) => {
                self.report(route, request.label(), &error);
                return Ok(Vec::new());
            }
        };

        match (request, reply) {
            (Request::CustomerName { code }, Reply::Name(name)) => {
                self.commit_header_name(HeaderField::Customer, &code, name);
                Ok(Vec::new())
            }
            (Request::ShipToName { code }, Reply::Name(name)) => {
                self.commit_header_name(HeaderField::ShipTo, &code, name);
                Ok(Vec::new())
            }
            (Request::MakerName { row, code }, Reply::Name(name)) => {
                let Some(line) = self.grid.line_mut(row) else {
                    return Ok(Vec::new());
                };
                if line.maker_code.trim() != code {
                    tracing::debug!(%row, code = %code, "maker code changed; dropping name");
                    return Ok(Vec::new());
                }
                line.maker_name = committed_name(name);
                self.board
                    .dispatch(StatusCommand::SetStatus(format!("maker {code} resolved")));
                self.persist();
                Ok(Vec::new())
            }
            (Request::Product { row, code }, Reply::Product(record)) => {
                let Some(line) = self.grid.line_mut(row) else {
                    return Ok(Vec::new());
                };
                if line.product_code.trim() != code {
                    tracing::debug!(%row, code = %code, "product code changed; dropping product");
                    return Ok(Vec::new());
                }
                line.apply_product(&record);
                line.forget_unit_options();
                let preferred = line.unit_name.clone();
                self.board
                    .dispatch(StatusCommand::SetStatus(format!("product {code} resolved")));
                tracing::info!(%row, code = %code, "product resolved");
                self.persist();
                Ok(self
                    .issue_units(row, ErrorRoute::Log, &preferred)
                    .into_iter()
                    .collect())
            }
            (
                Request::Units {
                    row,
                    product_code,
                    preferred,
                },
                Reply::Units(options),
            ) => {
                let Some(line) = self.grid.line_mut(row) else {
                    return Ok(Vec::new());
                };
                if line.product_code.trim() != product_code {
                    tracing::debug!(%row, product_code = %product_code, "product code changed; dropping units");
                    return Ok(Vec::new());
                }
                line.apply_unit_options(options, &preferred);
                self.board.dispatch(StatusCommand::SetStatus(format!(
                    "units loaded for product {product_code}"
                )));
                self.persist();
                Ok(self.issue_price(row, ErrorRoute::Log).into_iter().collect())
            }
            (request, reply) => bail!(
                "ticket {id} for a {} lookup completed with a mismatched reply: {reply:?}",
                request.label()
            ),
        }
    }

    fn complete_price(
        &mut self,
        id: TicketId,
        row: RowId,
        key: orderdesk_app::PricingKey,
        route: ErrorRoute,
        outcome: Result<Reply, LookupError>,
    ) -> Result<Vec<Ticket>> {
        let header = self.grid.header().clone();
        let Some(line) = self.grid.line_mut(row) else {
            tracing::debug!(%row, "price reply for a row that is gone");
            return Ok(Vec::new());
        };
        line.price_guard.in_flight = None;

        let quote = match outcome {
            Ok(Reply::Price(quote)) => quote,
            Ok(other) => bail!("ticket {id} for a price lookup completed with {other:?}"),
            Err(error) => {
                self.report(route, "price", &error);
                return Ok(Vec::new());
            }
        };

        let current = line.pricing_key(&header);
        if self.pricing == PricingPolicy::Revalidate && current.as_ref() != Some(&key) {
            tracing::debug!(%row, stale = %key.joined(), "discarding price for a superseded key");
            return Ok(self.issue_price(row, route).into_iter().collect());
        }

        line.apply_quote(&quote);
        line.price_guard.settled = Some(key);
        let source = quote.source.unwrap_or_default();
        tracing::info!(%row, source = %source, "price resolved");
        self.board
            .dispatch(StatusCommand::SetStatus(format!("price resolved: {source}")));
        self.persist();
        Ok(Vec::new())
    }

    fn commit_header_name(&mut self, field: HeaderField, code: &str, name: Option<String>) {
        let header = self.grid.header_mut();
        let (current, slot) = match field {
            HeaderField::Customer => (&header.customer_code, &mut header.customer_name),
            HeaderField::ShipTo => (&header.ship_to_code, &mut header.ship_to_name),
        };
        if current.trim() != code {
            tracing::debug!(field = field.label(), code, "header code changed; dropping name");
            return;
        }
        *slot = committed_name(name);
        self.board.dispatch(StatusCommand::SetStatus(format!(
            "{} {code} resolved",
            field.label()
        )));
        self.persist();
    }

    fn issue_header_name(
        &mut self,
        field: HeaderField,
        route: ErrorRoute,
        refresh_prices: bool,
    ) -> Vec<Ticket> {
        let header = self.grid.header_mut();
        let (code, name) = match field {
            HeaderField::Customer => (header.customer_code.trim().to_owned(), &mut header.customer_name),
            HeaderField::ShipTo => (header.ship_to_code.trim().to_owned(), &mut header.ship_to_name),
        };

        let mut tickets = Vec::new();
        if code.is_empty() {
            name.clear();
        } else {
            self.begin(format!("resolving {} {code}", field.label()));
            let request = match field {
                HeaderField::Customer => Request::CustomerName { code },
                HeaderField::ShipTo => Request::ShipToName { code },
            };
            tickets.push(self.ticket(route, request));
        }
        if refresh_prices {
            tickets.extend(self.refresh_all_prices());
        }
        tickets
    }

    fn issue_units(&mut self, row: RowId, route: ErrorRoute, preferred: &str) -> Option<Ticket> {
        let line = self.grid.line_mut(row)?;
        let product_code = line.product_code.trim().to_owned();
        if product_code.is_empty() {
            line.clear_units();
            return None;
        }
        self.begin(format!("loading units for product {product_code}"));
        Some(self.ticket(
            route,
            Request::Units {
                row,
                product_code,
                preferred: preferred.trim().to_owned(),
            },
        ))
    }

    /// Price guard. An incomplete key resets the row; a request already in
    /// flight for the row wins over any new one; a key equal to the last
    /// settled one needs no request.
    fn issue_price(&mut self, row: RowId, route: ErrorRoute) -> Option<Ticket> {
        let header = self.grid.header().clone();
        let line = self.grid.line_mut(row)?;
        let Some(key) = line.pricing_key(&header) else {
            line.reset_prices();
            tracing::debug!(%row, "pricing key incomplete; prices reset");
            self.persist();
            return None;
        };
        if let Some(pending) = &line.price_guard.in_flight {
            tracing::debug!(%row, pending = %pending.joined(), wanted = %key.joined(), "price request in flight; dropping");
            return None;
        }
        if line.price_guard.settled.as_ref() == Some(&key) {
            tracing::debug!(%row, key = %key.joined(), "price already settled");
            return None;
        }
        line.price_guard.in_flight = Some(key.clone());

        self.begin(format!(
            "resolving price: customer={} ship-to={} product={} rank={}",
            key.customer_code, key.ship_to_code, key.product_code, key.unit_rank
        ));
        Some(self.ticket(route, Request::Price { row, key }))
    }

    fn begin(&mut self, status: String) {
        self.board.dispatch(StatusCommand::ClearError);
        self.board.dispatch(StatusCommand::SetStatus(status));
    }

    fn ticket(&mut self, route: ErrorRoute, request: Request) -> Ticket {
        self.last_ticket += 1;
        Ticket {
            id: TicketId::new(self.last_ticket),
            route,
            request,
        }
    }

    fn report(&mut self, route: ErrorRoute, what: &str, error: &LookupError) {
        tracing::warn!(lookup = what, error = %error, "lookup failed");
        if route == ErrorRoute::Surface {
            self.board
                .dispatch(StatusCommand::SetError(format!("{what} lookup failed: {error}")));
        }
    }
}

fn committed_name(name: Option<String>) -> String {
    name.filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| NOT_REGISTERED.to_owned())
}
