// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use orderdesk_app::{NOT_REGISTERED, PricingKey, RowId, SelectionChannel, UnitOption};
use orderdesk_engine::{
    OrderSession, PricingPolicy, Request, SessionConfig, Ticket, drain, execute,
};
use orderdesk_testkit::{
    Call, CallKind, FIXTURE_ORIGIN, FakeBackend, MemoryStorage, pricing_key,
};

fn session_with(pricing: PricingPolicy) -> OrderSession<MemoryStorage> {
    let channel = SelectionChannel::new(FIXTURE_ORIGIN).expect("fixture origin parses");
    OrderSession::new(
        MemoryStorage::new(),
        SessionConfig {
            channel,
            pricing,
            seed_rows: Vec::new(),
        },
    )
}

fn session() -> OrderSession<MemoryStorage> {
    session_with(PricingPolicy::Commit)
}

fn run(
    session: &mut OrderSession<MemoryStorage>,
    backend: &FakeBackend,
    tickets: Vec<Ticket>,
) -> Result<usize> {
    drain(session, backend, tickets)
}

/// Customer 123 / ship-to 9 resolved, call log cleared.
fn with_header(backend: &FakeBackend) -> Result<OrderSession<MemoryStorage>> {
    let mut session = session();
    let tickets = session.set_customer_code("123");
    run(&mut session, backend, tickets)?;
    let tickets = session.set_ship_to_code("9");
    run(&mut session, backend, tickets)?;
    backend.clear_calls();
    Ok(session)
}

fn resolved_row(
    session: &mut OrderSession<MemoryStorage>,
    backend: &FakeBackend,
    product_code: &str,
) -> Result<RowId> {
    let (row, _) = session.add_row(None);
    let tickets = session.set_product_code(row, product_code)?;
    run(session, backend, tickets)?;
    Ok(row)
}

#[test]
fn product_edit_issues_only_the_product_lookup() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = with_header(&backend)?;
    let (row, _) = session.add_row(None);

    let tickets = session.set_product_code(row, "534687")?;
    assert_eq!(tickets.len(), 1);
    assert!(matches!(
        &tickets[0].request,
        Request::Product { code, .. } if code == "534687"
    ));
    assert!(backend.calls().is_empty(), "issuing must not call the backend");
    Ok(())
}

#[test]
fn single_unit_product_chains_product_units_then_price() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = with_header(&backend)?;
    let row = resolved_row(&mut session, &backend, "534687")?;

    assert_eq!(
        backend.calls(),
        vec![
            Call::Product("534687".to_owned()),
            Call::Units("534687".to_owned()),
            Call::Price(pricing_key("534687", "A")),
        ]
    );

    let line = session.grid().line(row).expect("row exists");
    assert_eq!(line.product_name, "Syringe 10mL");
    assert_eq!(line.maker_code, "M1");
    assert_eq!(line.unit_name, "箱");
    assert_eq!(line.unit_multiplier_name, "10入");
    assert_eq!(line.unit_rank, "A");
    assert_eq!(line.list_price, 1200);
    assert_eq!(line.sales_unit_price, 1000);
    assert_eq!(line.purchase_unit_price, 700);
    assert_eq!(line.price_source, "得意先単価");
    assert_eq!(line.supplier_code, "S01");
    assert_eq!(session.status().status(), "price resolved: 得意先単価");
    Ok(())
}

#[test]
fn identical_pricing_key_requests_at_most_once() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = with_header(&backend)?;
    let row = resolved_row(&mut session, &backend, "479238")?;

    let line = session.grid().line(row).expect("row exists");
    assert_eq!(line.unit_options.len(), 2);
    assert!(line.unit_name.is_empty(), "two options and no preference");
    assert_eq!(line.sales_unit_price, 0);
    assert_eq!(backend.count(CallKind::Price), 0);

    let first = session.select_unit(row, "個")?;
    let second = session.select_unit(row, "個")?;
    assert_eq!(first.len(), 1);
    assert!(second.is_empty(), "duplicate while in flight is dropped");
    run(&mut session, &backend, first)?;

    let third = session.select_unit(row, "個")?;
    assert!(third.is_empty(), "settled key needs no request");
    assert_eq!(
        backend.calls_of(CallKind::Price),
        vec![Call::Price(pricing_key("479238", "B"))]
    );
    assert_eq!(session.grid().line(row).expect("row").sales_unit_price, 20);
    Ok(())
}

#[test]
fn changing_any_key_component_makes_the_next_resolution_live() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = with_header(&backend)?;
    let row = resolved_row(&mut session, &backend, "534687")?;
    backend.clear_calls();

    let tickets = session.set_ship_to_code("10");
    let price_keys: Vec<&PricingKey> = tickets
        .iter()
        .filter_map(|ticket| match &ticket.request {
            Request::Price { key, .. } => Some(key),
            _ => None,
        })
        .collect();
    assert_eq!(price_keys.len(), 1);
    assert_eq!(price_keys[0].ship_to_code, "10");
    run(&mut session, &backend, tickets)?;

    let line = session.grid().line(row).expect("row exists");
    assert_eq!(line.sales_unit_price, 0, "unscripted key quotes zero");
    assert_eq!(session.grid().header().ship_to_name, NOT_REGISTERED);
    assert_eq!(backend.count(CallKind::Price), 1);
    Ok(())
}

#[test]
fn unit_change_reenters_price_with_new_rank() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = with_header(&backend)?;
    let row = resolved_row(&mut session, &backend, "479238")?;
    let tickets = session.select_unit(row, "箱")?;
    run(&mut session, &backend, tickets)?;
    assert_eq!(session.grid().line(row).expect("row").sales_unit_price, 800);

    let tickets = session.select_unit(row, "個")?;
    let line = session.grid().line(row).expect("row");
    assert_eq!(line.unit_rank, "B", "rank follows the unit without a request");
    assert_eq!(line.unit_multiplier_name, "");
    run(&mut session, &backend, tickets)?;
    assert_eq!(session.grid().line(row).expect("row").sales_unit_price, 20);
    Ok(())
}

#[test]
fn unknown_unit_is_rejected() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = with_header(&backend)?;
    let row = resolved_row(&mut session, &backend, "479238")?;
    assert!(session.select_unit(row, "袋").is_err());
    Ok(())
}

#[test]
fn quantity_and_price_edits_only_recompute_amounts() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = with_header(&backend)?;
    let (row, tickets) = session.add_row(None);
    assert!(tickets.is_empty());

    session.set_sales_price(row, 100)?;
    session.set_quantity(row, 10)?;
    assert_eq!(session.grid().line(row).expect("row").sales_amount, 1000);

    session.set_quantity(row, 0)?;
    session.set_purchase_price(row, 60)?;
    let line = session.grid().line(row).expect("row");
    assert_eq!(line.sales_amount, 0);
    assert_eq!(line.purchase_amount, 0);
    assert!(backend.calls().is_empty());
    Ok(())
}

#[test]
fn header_customer_resolution_reprices_every_row() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = session();
    let tickets = session.set_ship_to_code("9");
    run(&mut session, &backend, tickets)?;
    let first = resolved_row(&mut session, &backend, "534687")?;
    let second = resolved_row(&mut session, &backend, "50362")?;
    assert_eq!(
        backend.count(CallKind::Price),
        0,
        "no customer yet, so no complete key"
    );

    let tickets = session.set_customer_code("123");
    let kinds: Vec<&str> = tickets.iter().map(|ticket| ticket.request.label()).collect();
    assert_eq!(kinds, vec!["customer", "price", "price"]);
    run(&mut session, &backend, tickets)?;

    assert_eq!(session.grid().header().customer_name, "ACME");
    assert_eq!(session.grid().line(first).expect("row").sales_unit_price, 1000);
    assert_eq!(session.grid().line(second).expect("row").sales_unit_price, 400);
    assert_eq!(backend.count(CallKind::Price), 2);
    Ok(())
}

#[test]
fn clearing_customer_resets_row_prices_without_requests() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = with_header(&backend)?;
    let row = resolved_row(&mut session, &backend, "534687")?;
    backend.clear_calls();

    let tickets = session.set_customer_code("");
    assert!(tickets.is_empty());
    let line = session.grid().line(row).expect("row");
    assert_eq!(line.sales_unit_price, 0);
    assert_eq!(line.price_source, "");
    assert!(line.price_guard.settled.is_none());
    assert_eq!(session.grid().header().customer_name, "");
    assert!(backend.calls().is_empty());
    Ok(())
}

#[test]
fn unregistered_maker_commits_placeholder() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = with_header(&backend)?;
    let (row, _) = session.add_row(None);

    let tickets = session.set_maker_code(row, "ZZ")?;
    run(&mut session, &backend, tickets)?;
    assert_eq!(session.grid().line(row).expect("row").maker_name, NOT_REGISTERED);
    assert_eq!(session.status().error(), "");

    let tickets = session.set_maker_code(row, "  ")?;
    assert!(tickets.is_empty());
    let line = session.grid().line(row).expect("row");
    assert_eq!(line.maker_code, "");
    assert_eq!(line.maker_name, "");
    assert_eq!(backend.count(CallKind::Maker), 1);
    Ok(())
}

#[test]
fn product_reply_keeps_manually_entered_maker() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = with_header(&backend)?;
    let (row, _) = session.add_row(None);
    let tickets = session.set_maker_code(row, "M1")?;
    run(&mut session, &backend, tickets)?;

    let tickets = session.set_product_code(row, "50362")?;
    run(&mut session, &backend, tickets)?;
    let line = session.grid().line(row).expect("row");
    assert_eq!(line.maker_code, "M1");
    assert_eq!(line.maker_name, "Terumo");
    assert_eq!(line.product_name, "Glove M");
    Ok(())
}

#[test]
fn blank_product_code_resets_the_row_without_a_request() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = with_header(&backend)?;
    let row = resolved_row(&mut session, &backend, "534687")?;
    session.set_quantity(row, 3)?;
    backend.clear_calls();

    let tickets = session.set_product_code(row, "")?;
    assert!(tickets.is_empty());
    let line = session.grid().line(row).expect("row");
    assert_eq!(line.product_name, "");
    assert_eq!(line.unit_name, "");
    assert_eq!(line.unit_rank, "");
    assert!(line.unit_options.is_empty());
    assert_eq!(line.list_price, 0);
    assert_eq!(line.sales_unit_price, 0);
    assert_eq!(line.sales_amount, 0);
    assert_eq!(line.purchase_amount, 0);
    assert!(backend.calls().is_empty());
    Ok(())
}

#[test]
fn direct_edit_failure_surfaces_and_leaves_row_as_is() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = with_header(&backend)?;
    let (row, _) = session.add_row(None);
    backend.fail(CallKind::Product);

    let tickets = session.set_product_code(row, "534687")?;
    run(&mut session, &backend, tickets)?;
    assert!(session.status().error().contains("product lookup failed"));
    let line = session.grid().line(row).expect("row");
    assert_eq!(line.product_code, "534687");
    assert_eq!(line.product_name, "");
    assert_eq!(backend.count(CallKind::Units), 0);

    backend.recover(CallKind::Product);
    let tickets = session.set_product_code(row, "534687")?;
    run(&mut session, &backend, tickets)?;
    assert_eq!(session.status().error(), "", "the next lookup clears the error");
    Ok(())
}

#[test]
fn chained_failures_are_only_logged() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = with_header(&backend)?;
    let (row, _) = session.add_row(None);
    backend.fail(CallKind::Units);

    let tickets = session.set_product_code(row, "534687")?;
    run(&mut session, &backend, tickets)?;
    assert_eq!(session.status().error(), "");
    let line = session.grid().line(row).expect("row");
    assert_eq!(line.product_name, "Syringe 10mL", "product fields stay written");
    assert_eq!(backend.count(CallKind::Price), 0);
    Ok(())
}

#[test]
fn failed_price_request_can_be_retried() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = with_header(&backend)?;
    let row = resolved_row(&mut session, &backend, "479238")?;
    backend.fail(CallKind::Price);

    let tickets = session.select_unit(row, "箱")?;
    run(&mut session, &backend, tickets)?;
    assert!(session.status().error().contains("price lookup failed"));
    let line = session.grid().line(row).expect("row");
    assert!(line.price_guard.in_flight.is_none());
    assert!(line.price_guard.settled.is_none());

    backend.recover(CallKind::Price);
    let tickets = session.refresh_all_prices();
    assert_eq!(tickets.len(), 1);
    run(&mut session, &backend, tickets)?;
    assert_eq!(session.grid().line(row).expect("row").sales_unit_price, 800);
    Ok(())
}

#[test]
fn rows_have_independent_price_guards() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = with_header(&backend)?;
    let first = resolved_row(&mut session, &backend, "479238")?;
    let second = resolved_row(&mut session, &backend, "479238")?;

    let mut tickets = session.select_unit(first, "箱")?;
    tickets.extend(session.select_unit(second, "箱")?);
    assert_eq!(tickets.len(), 2);
    run(&mut session, &backend, tickets)?;
    assert_eq!(backend.count(CallKind::Price), 2);
    Ok(())
}

#[test]
fn commit_policy_writes_a_stale_reply() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = with_header(&backend)?;
    let row = resolved_row(&mut session, &backend, "479238")?;

    let pending = session.select_unit(row, "箱")?;
    assert!(session.select_unit(row, "個")?.is_empty());
    run(&mut session, &backend, pending)?;

    let line = session.grid().line(row).expect("row");
    assert_eq!(line.unit_rank, "B");
    assert_eq!(line.sales_unit_price, 800, "reply for rank A was committed");
    assert_eq!(line.price_guard.settled, Some(pricing_key("479238", "A")));

    let tickets = session.refresh_all_prices();
    run(&mut session, &backend, tickets)?;
    assert_eq!(session.grid().line(row).expect("row").sales_unit_price, 20);
    Ok(())
}

#[test]
fn revalidate_policy_discards_a_stale_reply_and_requests_the_current_key() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = session_with(PricingPolicy::Revalidate);
    let tickets = session.set_customer_code("123");
    run(&mut session, &backend, tickets)?;
    let tickets = session.set_ship_to_code("9");
    run(&mut session, &backend, tickets)?;
    let row = resolved_row(&mut session, &backend, "479238")?;
    backend.clear_calls();

    let pending = session.select_unit(row, "箱")?;
    assert!(session.select_unit(row, "個")?.is_empty());
    run(&mut session, &backend, pending)?;

    assert_eq!(
        backend.calls_of(CallKind::Price),
        vec![
            Call::Price(pricing_key("479238", "A")),
            Call::Price(pricing_key("479238", "B")),
        ]
    );
    let line = session.grid().line(row).expect("row");
    assert_eq!(line.sales_unit_price, 20);
    assert_eq!(line.price_guard.settled, Some(pricing_key("479238", "B")));
    Ok(())
}

#[test]
fn preferred_unit_survives_product_re_resolution() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = with_header(&backend)?;
    let row = resolved_row(&mut session, &backend, "479238")?;
    let tickets = session.select_unit(row, "個")?;
    run(&mut session, &backend, tickets)?;
    backend.clear_calls();

    backend.set_units(
        "479238",
        vec![
            UnitOption::new("箱", "50入", "A"),
            UnitOption::new("個", "", "B"),
            UnitOption::new("袋", "5入", "C"),
        ],
    );
    let tickets = session.set_product_code(row, "479238")?;
    run(&mut session, &backend, tickets)?;

    let line = session.grid().line(row).expect("row");
    assert_eq!(line.unit_name, "個");
    assert_eq!(line.unit_options.len(), 3);
    assert_eq!(
        backend.count(CallKind::Price),
        0,
        "same key as the settled one"
    );
    Ok(())
}

#[test]
fn unknown_row_edit_is_a_contract_violation() {
    let mut session = session();
    assert!(session.set_quantity(RowId::new(99), 1).is_err());
    assert!(session.set_product_code(RowId::new(99), "534687").is_err());
}

#[test]
fn arrangement_must_be_an_offered_option() -> Result<()> {
    let mut session = session();
    let (row, _) = session.add_row(None);
    session.set_arrangement(row, "全数発注(※)")?;
    assert!(session.set_arrangement(row, "whenever").is_err());
    assert_eq!(
        session.grid().line(row).expect("row").arrangement,
        "全数発注(※)"
    );
    Ok(())
}

#[test]
fn units_reply_for_a_replaced_product_is_dropped() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = with_header(&backend)?;
    let (row, _) = session.add_row(None);
    let tickets = session.set_product_code(row, "479238")?;
    let Some(product) = tickets.into_iter().next() else {
        panic!("product ticket expected");
    };
    let outcome = execute(&backend, &product.request);
    let units = session.complete(product, outcome)?;
    assert_eq!(units.len(), 1);

    let tickets = session.set_product_code(row, "534687")?;
    let Some(units) = units.into_iter().next() else {
        panic!("units ticket expected");
    };
    let outcome = execute(&backend, &units.request);
    assert!(session.complete(units, outcome)?.is_empty());
    let line = session.grid().line(row).expect("row");
    assert!(line.unit_options.is_empty(), "options of 479238 were not applied");
    assert_eq!(line.unit_rank, "");

    run(&mut session, &backend, tickets)?;
    let line = session.grid().line(row).expect("row");
    assert_eq!(line.unit_name, "箱");
    assert_eq!(line.unit_rank, "A");
    assert_eq!(line.sales_unit_price, 1000);
    Ok(())
}

#[test]
fn product_reply_after_the_code_was_edited_is_dropped() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = with_header(&backend)?;
    let (row, _) = session.add_row(None);
    let stale = session.set_product_code(row, "479238")?;
    let current = session.set_product_code(row, "50362")?;

    let Some(ticket) = stale.into_iter().next() else {
        panic!("product ticket expected");
    };
    let outcome = execute(&backend, &ticket.request);
    assert!(session.complete(ticket, outcome)?.is_empty(), "no units request follows");
    let line = session.grid().line(row).expect("row");
    assert_eq!(line.product_code, "50362");
    assert_eq!(line.product_name, "");

    run(&mut session, &backend, current)?;
    let line = session.grid().line(row).expect("row");
    assert_eq!(line.product_name, "Glove M");
    assert_eq!(line.maker_code, "M2");
    assert_eq!(line.unit_name, "袋");
    Ok(())
}

#[test]
fn late_header_names_for_replaced_codes_are_dropped() -> Result<()> {
    let backend = FakeBackend::catalog();
    backend.add_customer("456", "Beta Pharmacy");
    backend.add_ship_to("10", "South Clinic");
    let mut session = session();

    let stale_customer = session.set_customer_code("123");
    let stale_ship_to = session.set_ship_to_code("9");
    let current_customer = session.set_customer_code("456");
    let current_ship_to = session.set_ship_to_code("10");

    run(&mut session, &backend, current_customer)?;
    run(&mut session, &backend, current_ship_to)?;
    run(&mut session, &backend, stale_customer)?;
    run(&mut session, &backend, stale_ship_to)?;

    let header = session.grid().header();
    assert_eq!(header.customer_code, "456");
    assert_eq!(header.customer_name, "Beta Pharmacy");
    assert_eq!(header.ship_to_code, "10");
    assert_eq!(header.ship_to_name, "South Clinic");
    Ok(())
}

#[test]
fn failed_units_reload_leaves_no_rank_from_the_previous_product() -> Result<()> {
    let backend = FakeBackend::catalog();
    let mut session = with_header(&backend)?;
    let row = resolved_row(&mut session, &backend, "534687")?;
    assert_eq!(session.grid().line(row).expect("row").unit_rank, "A");
    backend.fail(CallKind::Units);
    backend.clear_calls();

    let tickets = session.set_product_code(row, "50362")?;
    run(&mut session, &backend, tickets)?;
    let line = session.grid().line(row).expect("row");
    assert_eq!(line.product_name, "Glove M");
    assert!(line.unit_options.is_empty());
    assert_eq!(line.unit_rank, "");
    assert_eq!(line.unit_multiplier_name, "");

    assert!(session.refresh_all_prices().is_empty(), "no complete key to price");
    assert_eq!(backend.count(CallKind::Price), 0);
    Ok(())
}
