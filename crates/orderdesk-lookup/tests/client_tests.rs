// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use orderdesk_app::{
    DocumentHeader, DocumentItem, DocumentPayload, Lookup, LookupError, PartyTarget, PricingKey,
    ProductSearch,
};
use orderdesk_lookup::Client;
use std::io::Read;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tiny_http::{Header, Response, Server};

struct Reply {
    status: u16,
    body: String,
    headers: Vec<(&'static str, &'static str)>,
    delay: Duration,
}

impl Reply {
    fn json(body: &str) -> Self {
        Self {
            status: 200,
            body: body.to_owned(),
            headers: vec![("Content-Type", "application/json")],
            delay: Duration::ZERO,
        }
    }
}

/// Serves `expected.len()` requests, checking each method and raw URL, and
/// hands back the request bodies it saw.
fn serve(
    expected: Vec<(&'static str, String, Reply)>,
) -> Result<(String, JoinHandle<Vec<String>>)> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let base = format!("http://{}/api", server.server_addr());

    let handle = thread::spawn(move || {
        let mut bodies = Vec::new();
        for (method, url, reply) in expected {
            let mut request = server.recv().expect("request expected");
            assert_eq!(request.method().as_str(), method);
            assert_eq!(request.url(), url);
            let mut body = String::new();
            request
                .as_reader()
                .read_to_string(&mut body)
                .expect("request body should read");
            bodies.push(body);

            thread::sleep(reply.delay);
            let mut response = Response::from_string(reply.body).with_status_code(reply.status);
            for (name, value) in reply.headers {
                response = response.with_header(
                    Header::from_bytes(name, value).expect("valid header"),
                );
            }
            request.respond(response).expect("response should succeed");
        }
        bodies
    });
    Ok((base, handle))
}

fn client(base: &str) -> Result<Client> {
    Client::new(base)
}

#[test]
fn unreachable_backend_names_the_setting_to_check() {
    let client = Client::new("http://127.0.0.1:1/api")
        .expect("client should initialize");

    let error = client
        .customer_name("123")
        .expect_err("lookup should fail for unreachable endpoint");
    assert!(matches!(error, LookupError::Unreachable { .. }));
    assert!(error.to_string().contains("base_url"));
}

#[test]
fn constructor_rejects_unusable_base_urls() {
    assert!(Client::new("").is_err());
    assert!(Client::new("localhost:8000").is_err());
    assert!(Client::new("mailto:orders@example.com").is_err());
}

#[test]
fn name_lookups_encode_codes_and_map_null_to_not_registered() -> Result<()> {
    let (base, handle) = serve(vec![
        (
            "GET",
            "/api/customers/123".to_owned(),
            Reply::json(r#"{"tcode":123,"customer_name":"ACME"}"#),
        ),
        (
            "GET",
            "/api/shipto/9%2F1".to_owned(),
            Reply::json(r#"{"jcode":"9/1","shipto_name":null}"#),
        ),
        (
            "GET",
            "/api/makers/M1".to_owned(),
            Reply::json(r#"{"maker_cd":"M1","maker_name":"  "}"#),
        ),
    ])?;

    let client = client(&base)?;
    assert_eq!(client.customer_name("123")?.as_deref(), Some("ACME"));
    assert_eq!(client.ship_to_name("9/1")?, None);
    assert_eq!(client.maker_name(" M1 ")?, None);

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn blank_code_is_rejected_without_a_request() -> Result<()> {
    let client = Client::new("http://127.0.0.1:1/api")?;
    let error = client.product("  ").expect_err("blank code");
    assert!(matches!(error, LookupError::InvalidRequest(_)));
    Ok(())
}

#[test]
fn product_and_units_decode_lenient_payloads() -> Result<()> {
    let (base, handle) = serve(vec![
        (
            "GET",
            "/api/products/534687".to_owned(),
            Reply::json(
                r#"{"product_cd":534687,"product_name":"Syringe","maker_cd":7,"maker_name":"Terumo","maker_part_no":null,"spec":"10mL","supplier_code":"S01","supplier_name":"Central"}"#,
            ),
        ),
        (
            "GET",
            "/api/products/units?product_cd=534687".to_owned(),
            Reply::json(
                r#"{"items":[{"unit_name":"箱","irisu_name":"10入","irisu_rank":"A"},{"unit_name":"","irisu_name":"","irisu_rank":""}]}"#,
            ),
        ),
    ])?;

    let client = client(&base)?;
    let record = client.product("534687")?;
    assert_eq!(record.product_code, "534687");
    assert_eq!(record.maker_code.as_deref(), Some("7"));
    assert_eq!(record.part_number, None);
    assert_eq!(record.supplier_name.as_deref(), Some("Central"));

    let units = client.unit_options("534687")?;
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].rank, "A");

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn price_resolution_posts_the_key_and_tolerates_string_numbers() -> Result<()> {
    let (base, handle) = serve(vec![(
        "POST",
        "/api/pricing/resolve".to_owned(),
        Reply::json(
            r#"{"source":"得意先単価","teika":"1200","sales_price":1000,"purchase_price":null,"supplier_code":"S02"}"#,
        ),
    )])?;

    let client = client(&base)?;
    let quote = client.resolve_price(&PricingKey {
        customer_code: "123".to_owned(),
        ship_to_code: "9".to_owned(),
        product_code: "534687".to_owned(),
        unit_rank: "A".to_owned(),
    })?;
    assert_eq!(quote.list_price, 1200);
    assert_eq!(quote.sales_price, 1000);
    assert_eq!(quote.purchase_price, 0);
    assert_eq!(quote.source.as_deref(), Some("得意先単価"));
    assert_eq!(quote.supplier_code.as_deref(), Some("S02"));

    let bodies = handle.join().expect("server thread should join");
    let sent: serde_json::Value = serde_json::from_str(&bodies[0])?;
    assert_eq!(
        sent,
        serde_json::json!({"tcode": "123", "jcode": "9", "scode": "534687", "irank": "A"})
    );
    Ok(())
}

#[test]
fn slow_backend_reply_is_still_a_quote() -> Result<()> {
    let (base, handle) = serve(vec![(
        "POST",
        "/api/pricing/resolve".to_owned(),
        Reply {
            delay: Duration::from_millis(1500),
            ..Reply::json(r#"{"teika":900,"sales_price":800,"purchase_price":600}"#)
        },
    )])?;

    let client = client(&base)?;
    let quote = client.resolve_price(&PricingKey {
        customer_code: "123".to_owned(),
        ship_to_code: String::new(),
        product_code: "534687".to_owned(),
        unit_rank: "A".to_owned(),
    })?;
    assert_eq!(quote.list_price, 900);
    assert_eq!(quote.sales_price, 800);
    assert_eq!(quote.purchase_price, 600);

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn non_success_status_carries_method_path_and_detail() -> Result<()> {
    let (base, handle) = serve(vec![(
        "GET",
        "/api/products/9".to_owned(),
        Reply {
            status: 500,
            body: r#"{"detail":"database unavailable"}"#.to_owned(),
            headers: vec![("Content-Type", "application/json")],
            delay: Duration::ZERO,
        },
    )])?;

    let client = client(&base)?;
    let error = client.product("9").expect_err("server error");
    match error {
        LookupError::Status {
            method,
            path,
            status,
            body,
        } => {
            assert_eq!(method, "GET");
            assert_eq!(path, "/api/products/9");
            assert_eq!(status, 500);
            assert_eq!(body, "database unavailable");
        }
        other => panic!("expected status error, got {other:?}"),
    }

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn searches_send_only_filled_filters() -> Result<()> {
    let (base, handle) = serve(vec![
        (
            "GET",
            "/api/customers/search?q=AC".to_owned(),
            Reply::json(r#"{"items":[{"tcode":123,"customer_name":"ACME"}]}"#),
        ),
        (
            "GET",
            "/api/products/search?maker_cd=M1&limit=200".to_owned(),
            Reply::json(r#"[{"product_cd":"534687","product_name":"Syringe","maker_cd":"M1"}]"#),
        ),
    ])?;

    let client = client(&base)?;
    assert!(client.search_parties(PartyTarget::Maker, "   ")?.is_empty());
    let hits = client.search_parties(PartyTarget::Customer, " AC ")?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].code, "123");
    assert_eq!(hits[0].name, "ACME");

    let products = client.search_products(&ProductSearch {
        maker_code: "M1".to_owned(),
        ..ProductSearch::default()
    })?;
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].product_code, "534687");

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn document_bytes_and_filename_come_back() -> Result<()> {
    let (base, handle) = serve(vec![
        (
            "POST",
            "/api/orders/pdf_v2".to_owned(),
            Reply {
                status: 200,
                body: "%PDF-1.4\n".to_owned(),
                headers: vec![
                    ("Content-Type", "application/pdf"),
                    (
                        "Content-Disposition",
                        "attachment; filename*=UTF-8''order_2026-02-19.pdf",
                    ),
                ],
                delay: Duration::ZERO,
            },
        ),
        (
            "GET",
            "/api/health".to_owned(),
            Reply::json(r#"{"ok":true}"#),
        ),
    ])?;

    let client = client(&base)?;
    let document = client.generate_document(&DocumentPayload {
        header: DocumentHeader {
            order_date: "2026-02-19".to_owned(),
            customer_cd: Some("123".to_owned()),
            customer_name: None,
            shipto_cd: None,
            shipto_name: None,
            tcode: Some("123".to_owned()),
            jcode: None,
        },
        items: vec![DocumentItem {
            scode: "534687".to_owned(),
            irank: "A".to_owned(),
            qty: 10,
            name: "Syringe".to_owned(),
            price: 1000,
            sales_amount: 10_000,
            purchase_price: 700,
            purchase_amount: 7000,
            spec: String::new(),
            unit_name: "箱".to_owned(),
            irisu_name: "10入".to_owned(),
            supplier_code: String::new(),
            supplier_name: String::new(),
            delivery_place_name: String::new(),
            line_note: String::new(),
        }],
    })?;
    assert_eq!(document.filename.as_deref(), Some("order_2026-02-19.pdf"));
    assert_eq!(document.bytes, b"%PDF-1.4\n".to_vec());
    client.ping()?;

    let bodies = handle.join().expect("server thread should join");
    let sent: serde_json::Value = serde_json::from_str(&bodies[0])?;
    assert_eq!(sent["header"]["order_date"], "2026-02-19");
    assert!(sent["header"].get("shipto_cd").is_none());
    assert_eq!(sent["items"][0]["qty"], 10);
    Ok(())
}
