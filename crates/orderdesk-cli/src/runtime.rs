// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use orderdesk_app::{
    DraftStorage, InboundMessage, LineRecord, Lookup, LookupError, PartyHit, PartySearchMode,
    PartyTarget, PickerKind, PickerWindow, PopupBlocked, PopupLauncher, PopupRequest,
    ProductRecord, ProductSearch, RowId, WindowHost, WindowSpec,
};
use orderdesk_engine::{OrderSession, Reply, Ticket, execute};
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use time::{Date, OffsetDateTime};

pub type SharedLookup = Arc<dyn Lookup + Send + Sync>;

struct Completion {
    ticket: Ticket,
    outcome: Result<Reply, LookupError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

#[derive(Debug, Clone, Copy)]
enum PickerPage {
    Party(PartySearchMode),
    Maker,
    Product,
}

impl PickerPage {
    /// Reads the page and its initial query back out of the window URL, the
    /// way the picker page itself would.
    fn from_spec(spec: &WindowSpec) -> Option<(Self, String)> {
        let param = |name: &str| {
            spec.url
                .query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
                .unwrap_or_default()
        };
        match spec.url.path() {
            "/customer_search.html" => Some((
                Self::Party(PartySearchMode::from_param(&param("mode"))),
                param("q"),
            )),
            "/maker_search.html" => Some((Self::Maker, param("q"))),
            "/product_search.html" => Some((Self::Product, param("maker_cd"))),
            _ => None,
        }
    }

    const fn title(self) -> &'static str {
        match self {
            Self::Party(mode) => mode.title,
            Self::Maker => "メーカー検索",
            Self::Product => "商品検索",
        }
    }
}

enum Hits {
    Unsearched,
    Parties(Vec<PartyHit>),
    Products(Vec<ProductRecord>),
}

impl Hits {
    fn len(&self) -> usize {
        match self {
            Self::Unsearched => 0,
            Self::Parties(hits) => hits.len(),
            Self::Products(hits) => hits.len(),
        }
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct OpenPicker {
    name: &'static str,
    page: PickerPage,
    initial: String,
    window: PickerWindow,
    hits: Hits,
}

/// Picker windows rendered in the terminal. Opening a window under a name
/// that is already open replaces it.
#[derive(Default)]
pub struct TerminalHost {
    open: Vec<OpenPicker>,
}

impl TerminalHost {
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.open.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    fn current(&mut self) -> Result<&mut OpenPicker> {
        self.open
            .last_mut()
            .context("no picker is open -- use `pick customer|shipto|maker|product` first")
    }
}

impl WindowHost for TerminalHost {
    fn open(&mut self, spec: &WindowSpec, window: PickerWindow) -> Result<(), PopupBlocked> {
        let Some((page, initial)) = PickerPage::from_spec(spec) else {
            tracing::warn!(url = %spec.url, "no terminal picker for this page");
            return Err(PopupBlocked);
        };
        self.open.retain(|picker| picker.name != spec.name);
        self.open.push(OpenPicker {
            name: spec.name,
            page,
            initial,
            window,
            hits: Hits::Unsearched,
        });
        Ok(())
    }
}

/// Owns the session thread. Lookups run on worker threads and come back
/// over a channel; the session only ever changes here.
pub struct ShellRuntime<S: DraftStorage> {
    session: OrderSession<S>,
    lookup: SharedLookup,
    launcher: PopupLauncher,
    host: TerminalHost,
    document_dir: PathBuf,
    clock: fn() -> Date,
    done_tx: Sender<Completion>,
    done_rx: Receiver<Completion>,
    opener: Sender<InboundMessage>,
    inbox: Receiver<InboundMessage>,
    outstanding: usize,
    shown: (String, String),
}

impl<S: DraftStorage> ShellRuntime<S> {
    pub fn new(
        session: OrderSession<S>,
        lookup: SharedLookup,
        launcher: PopupLauncher,
        document_dir: PathBuf,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::channel();
        let (opener, inbox) = mpsc::channel();
        Self {
            session,
            lookup,
            launcher,
            host: TerminalHost::default(),
            document_dir,
            clock: today,
            done_tx,
            done_rx,
            opener,
            inbox,
            outstanding: 0,
            shown: (String::new(), String::new()),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: fn() -> Date) -> Self {
        self.clock = clock;
        self
    }

    #[cfg(test)]
    pub fn session(&self) -> &OrderSession<S> {
        &self.session
    }

    #[cfg(test)]
    pub fn host(&self) -> &TerminalHost {
        &self.host
    }

    /// Restores the draft (or seeds starter rows) and waits for the
    /// resulting lookups.
    pub fn start(&mut self) -> Result<usize> {
        let tickets = self.session.reload((self.clock)());
        self.dispatch(tickets)?;
        self.settle()
    }

    fn dispatch(&mut self, tickets: Vec<Ticket>) -> Result<()> {
        for ticket in tickets {
            let lookup = Arc::clone(&self.lookup);
            let done = self.done_tx.clone();
            thread::Builder::new()
                .name(format!("lookup-{}", ticket.request.label()))
                .spawn(move || {
                    let outcome = execute(lookup.as_ref(), &ticket.request);
                    let _ = done.send(Completion { ticket, outcome });
                })
                .context("spawn lookup worker")?;
            self.outstanding += 1;
        }
        Ok(())
    }

    /// Applies completions and picker messages until nothing is outstanding.
    /// Returns how many lookups completed.
    pub fn settle(&mut self) -> Result<usize> {
        let mut completed = 0;
        loop {
            while let Ok(message) = self.inbox.try_recv() {
                let tickets = self.session.deliver(&message);
                self.dispatch(tickets)?;
            }
            if self.outstanding == 0 {
                return Ok(completed);
            }

            let done = self
                .done_rx
                .recv()
                .context("lookup workers disconnected")?;
            self.outstanding -= 1;
            completed += 1;
            let follow = self.session.complete(done.ticket, done.outcome)?;
            self.dispatch(follow)?;
        }
    }

    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<()> {
        writeln!(out, "orderdesk -- type `help` for commands")?;
        self.report(out)?;
        let mut lines = input.lines();
        loop {
            write!(out, "> ")?;
            out.flush()?;
            let Some(line) = lines.next() else {
                break;
            };
            let line = line.context("read command")?;

            let flow = match self.execute_line(&line, out) {
                Ok(flow) => flow,
                Err(error) => {
                    writeln!(out, "error: {error:#}")?;
                    Flow::Continue
                }
            };
            self.settle()?;
            self.report(out)?;
            if flow == Flow::Quit {
                break;
            }
        }
        Ok(())
    }

    pub fn execute_line(&mut self, line: &str, out: &mut dyn Write) -> Result<Flow> {
        let (command, rest) = split_word(line);
        match command {
            "" => {}
            "help" | "?" => print_commands(out)?,
            "quit" | "exit" => return Ok(Flow::Quit),
            "show" => self.render(out)?,
            "date" => self.session.set_issue_date(rest),
            "customer" => {
                let tickets = self.session.set_customer_code(rest);
                self.dispatch(tickets)?;
            }
            "shipto" => {
                let tickets = self.session.set_ship_to_code(rest);
                self.dispatch(tickets)?;
            }
            "add" => {
                let (product_code, quantity) = split_word(rest);
                let prefill = if product_code.is_empty() {
                    None
                } else {
                    Some(LineRecord {
                        product_code: product_code.to_owned(),
                        quantity: if quantity.is_empty() {
                            0
                        } else {
                            parse_amount("quantity", quantity)?
                        },
                        ..LineRecord::default()
                    })
                };
                let (row, tickets) = self.session.add_row(prefill.as_ref());
                writeln!(out, "added row {row}")?;
                self.dispatch(tickets)?;
            }
            "maker" | "product" | "unit" => {
                let (raw_row, value) = split_word(rest);
                let row = self.row_arg(raw_row)?;
                let tickets = match command {
                    "maker" => self.session.set_maker_code(row, value)?,
                    "product" => self.session.set_product_code(row, value)?,
                    _ => self.session.select_unit(row, value)?,
                };
                self.dispatch(tickets)?;
            }
            "qty" | "price" | "cost" => {
                let (raw_row, value) = split_word(rest);
                let row = self.row_arg(raw_row)?;
                match command {
                    "qty" => self
                        .session
                        .set_quantity(row, parse_amount("quantity", value)?)?,
                    "price" => self
                        .session
                        .set_sales_price(row, parse_amount("sales price", value)?)?,
                    _ => self
                        .session
                        .set_purchase_price(row, parse_amount("purchase price", value)?)?,
                }
            }
            "tehai" | "place" | "note" => {
                let (raw_row, value) = split_word(rest);
                let row = self.row_arg(raw_row)?;
                match command {
                    "tehai" => self.session.set_arrangement(row, value)?,
                    "place" => self.session.set_delivery_place(row, value)?,
                    _ => self.session.set_line_note(row, value)?,
                }
            }
            "refresh" => {
                let tickets = self.session.refresh_all_prices();
                self.dispatch(tickets)?;
            }
            "pick" => self.pick(rest, out)?,
            "find" => self.find(rest, out)?,
            "choose" => self.choose(rest)?,
            "issue" => {
                let path = self.issue()?;
                writeln!(out, "wrote {}", path.display())?;
            }
            unknown => bail!("unknown command {unknown:?}; type `help` for the command list"),
        }
        Ok(Flow::Continue)
    }

    fn row_arg(&self, raw: &str) -> Result<RowId> {
        RowId::parse(raw)
            .filter(|id| self.session.grid().line(*id).is_some())
            .with_context(|| format!("no row {raw:?}; run `show` to list row numbers"))
    }

    fn pick(&mut self, rest: &str, out: &mut dyn Write) -> Result<()> {
        let (target, rest) = split_word(rest);
        let request = match target {
            "customer" | "shipto" => PopupRequest {
                kind: if target == "shipto" {
                    PickerKind::ShipTo
                } else {
                    PickerKind::Customer
                },
                row_id: None,
                query: rest.to_owned(),
            },
            "maker" | "product" => {
                let (raw_row, query) = split_word(rest);
                let row = self.row_arg(raw_row)?;
                let kind = if target == "maker" {
                    PickerKind::Maker
                } else {
                    PickerKind::Product
                };
                let query = match (kind, query.is_empty()) {
                    (PickerKind::Product, true) => self
                        .session
                        .grid()
                        .line(row)
                        .map(|line| line.maker_code.clone())
                        .unwrap_or_default(),
                    _ => query.to_owned(),
                };
                PopupRequest {
                    kind,
                    row_id: Some(row),
                    query,
                }
            }
            other => bail!("cannot pick {other:?}; use customer, shipto, maker <row>, or product <row>"),
        };

        let opened = self.session.open_picker(
            &self.launcher,
            &mut self.host,
            &request,
            self.opener.clone(),
        )?;
        if !opened {
            return Ok(());
        }
        let picker = self.host.current()?;
        writeln!(out, "{} -- `find <text>` to search, `choose <n>` to select", picker.page.title())?;
        if !picker.initial.trim().is_empty() {
            self.find("", out)?;
        }
        Ok(())
    }

    fn find(&mut self, text: &str, out: &mut dyn Write) -> Result<()> {
        let lookup = Arc::clone(&self.lookup);
        let picker = self.host.current()?;
        let query = if text.is_empty() {
            picker.initial.clone()
        } else {
            text.to_owned()
        };

        picker.hits = match picker.page {
            PickerPage::Party(mode) => Hits::Parties(lookup.search_parties(mode.target, &query)?),
            PickerPage::Maker => Hits::Parties(lookup.search_parties(PartyTarget::Maker, &query)?),
            PickerPage::Product => Hits::Products(lookup.search_products(&ProductSearch {
                maker_code: picker.initial.clone(),
                product_name: text.to_owned(),
                ..ProductSearch::default()
            })?),
        };

        match &picker.hits {
            Hits::Unsearched => {}
            Hits::Parties(hits) => {
                for (index, hit) in hits.iter().enumerate() {
                    writeln!(out, "{:>3}. {:<10} {}", index + 1, hit.code, hit.name)?;
                }
            }
            Hits::Products(hits) => {
                for (index, hit) in hits.iter().enumerate() {
                    writeln!(
                        out,
                        "{:>3}. {:<10} {:<24} {:<8} {}",
                        index + 1,
                        hit.product_code,
                        hit.product_name.as_deref().unwrap_or(""),
                        hit.maker_code.as_deref().unwrap_or(""),
                        hit.part_number.as_deref().unwrap_or(""),
                    )?;
                }
            }
        }
        if picker.hits.is_empty() {
            writeln!(out, "no matches")?;
        }
        Ok(())
    }

    fn choose(&mut self, raw: &str) -> Result<()> {
        let index: usize = raw
            .trim()
            .parse()
            .with_context(|| format!("choose takes a match number, got {raw:?}"))?;
        let available = self.host.current()?.hits.len();
        if index == 0 || index > available {
            bail!("no match {index}; run `find` and pick a number between 1 and {available}");
        }
        let Some(OpenPicker {
            page, window, hits, ..
        }) = self.host.open.pop()
        else {
            bail!("no picker is open");
        };

        match (page, hits) {
            (PickerPage::Party(mode), Hits::Parties(hits)) => {
                let hit = hits.get(index - 1).context("match vanished")?;
                window.select_party(&mode, hit)
            }
            (PickerPage::Maker, Hits::Parties(hits)) => {
                let hit = hits.get(index - 1).context("match vanished")?;
                window.select_maker(hit)
            }
            (PickerPage::Product, Hits::Products(hits)) => {
                let hit = hits.get(index - 1).context("match vanished")?;
                window.select_product(hit)
            }
            _ => bail!("picker results do not match the picker; run `find` again"),
        }
    }

    fn issue(&mut self) -> Result<PathBuf> {
        let document = self
            .session
            .issue_document(self.lookup.as_ref(), (self.clock)())?;
        let filename = Path::new(&document.filename)
            .file_name()
            .map(PathBuf::from)
            .with_context(|| format!("backend filename {:?} is not a file name", document.filename))?;

        fs::create_dir_all(&self.document_dir).with_context(|| {
            format!(
                "create document directory {} -- set [output].document_dir to a writable path",
                self.document_dir.display()
            )
        })?;
        let path = self.document_dir.join(filename);
        fs::write(&path, &document.bytes)
            .with_context(|| format!("write document {}", path.display()))?;
        tracing::info!(path = %path.display(), "document saved");
        Ok(path)
    }

    fn render(&self, out: &mut dyn Write) -> Result<()> {
        let grid = self.session.grid();
        let header = grid.header();
        writeln!(out, "issue date  {}", header.issue_date)?;
        writeln!(out, "customer    {} {}", header.customer_code, header.customer_name)?;
        writeln!(out, "ship-to     {} {}", header.ship_to_code, header.ship_to_name)?;
        writeln!(
            out,
            "{:>4}  {:<6} {:<12} {:<8} {:<20} {:>5} {:<4} {:>8} {:>10} {:>8} {:>10}  tehai",
            "row", "maker", "maker name", "product", "name", "qty", "unit", "price", "amount", "cost",
            "cost amt"
        )?;
        for line in grid.lines() {
            writeln!(
                out,
                "{:>4}  {:<6} {:<12} {:<8} {:<20} {:>5} {:<4} {:>8} {:>10} {:>8} {:>10}  {}",
                line.id,
                line.maker_code,
                line.maker_name,
                line.product_code,
                line.product_name,
                line.quantity,
                line.unit_name,
                line.sales_unit_price,
                line.sales_amount,
                line.purchase_unit_price,
                line.purchase_amount,
                line.arrangement,
            )?;
        }
        Ok(())
    }

    fn report(&mut self, out: &mut dyn Write) -> Result<()> {
        let board = self.session.status();
        let current = (board.status().to_owned(), board.error().to_owned());
        if current == self.shown {
            return Ok(());
        }
        if !current.0.is_empty() {
            writeln!(out, "status: {}", current.0)?;
        }
        if !current.1.is_empty() {
            writeln!(out, "error: {}", current.1)?;
        }
        self.shown = current;
        Ok(())
    }
}

fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim();
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    }
}

fn parse_amount(what: &str, raw: &str) -> Result<i64> {
    raw.trim()
        .parse()
        .with_context(|| format!("{what} must be a whole number, got {raw:?}"))
}

fn print_commands(out: &mut dyn Write) -> Result<()> {
    for line in [
        "show                          print the order",
        "date <YYYY-MM-DD>             set the issue date",
        "customer [code]               set (or clear) the customer code",
        "shipto [code]                 set (or clear) the ship-to code",
        "add [product [qty]]           append a row",
        "maker|product <row> [code]    set a row's maker or product code",
        "qty|price|cost <row> <n>      set quantity, sales price, or purchase price",
        "unit <row> <name>             choose a unit",
        "tehai <row> [option]          set the arrangement",
        "place|note <row> [text]       set delivery place or line note",
        "refresh                       re-price every row",
        "pick customer|shipto [q]      open a picker (also: maker <row>, product <row>)",
        "find [text]                   search in the open picker",
        "choose <n>                    send a match back to the order",
        "issue                         generate the order document",
        "quit                          leave the shell",
    ] {
        writeln!(out, "{line}")?;
    }
    Ok(())
}
