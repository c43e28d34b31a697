// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use orderdesk_app::wire::text_of;
use orderdesk_app::{
    DocumentPayload, GeneratedDocument, Lookup, LookupError, PartyHit, PartyTarget, PriceQuote,
    PricingKey, ProductRecord, ProductSearch, UnitOption,
};
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::CONTENT_DISPOSITION;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Blocking HTTP client for the order backend. Every path is relative to
/// `base_url`, which normally ends in `/api`. Requests wait as long as the
/// backend takes; only transport errors and non-success statuses fail.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str) -> Result<Self> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            bail!("backend.base_url must not be empty");
        }
        let parsed = Url::parse(trimmed).with_context(|| {
            format!("parse backend.base_url {trimmed:?} -- use a URL like http://localhost:8000/api")
        })?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            bail!("backend.base_url {trimmed:?} must be an http(s) URL");
        }

        // reqwest's blocking client gives up after 30s unless told otherwise.
        let http = HttpClient::builder()
            .timeout(None::<Duration>)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url: parsed,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Appends path segments, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, LookupError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                LookupError::InvalidRequest(format!("{} cannot take a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn send(
        &self,
        method: &'static str,
        url: &Url,
        request: RequestBuilder,
    ) -> Result<Response, LookupError> {
        let response = request
            .send()
            .map_err(|error| connection_error(self.base_url.as_str(), error))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::debug!(method, path = url.path(), status = status.as_u16(), "backend error");
            return Err(LookupError::Status {
                method,
                path: url.path().to_owned(),
                status: status.as_u16(),
                body: clean_body(&body),
            });
        }
        Ok(response)
    }

    fn get_value(&self, url: Url, what: &str) -> Result<Value, LookupError> {
        let response = self.send("GET", &url, self.http.get(url.clone()))?;
        decode(response, what)
    }

    fn post_value<B: serde::Serialize>(
        &self,
        url: Url,
        body: &B,
        what: &str,
    ) -> Result<Value, LookupError> {
        let response = self.send("POST", &url, self.http.post(url.clone()).json(body))?;
        decode(response, what)
    }

    /// Name lookups share one shape: `{<code key>: ..., <name key>: name|null}`.
    fn name(&self, resource: &str, code: &str, field: &str) -> Result<Option<String>, LookupError> {
        let code = required(code, resource)?;
        let url = self.endpoint(&[resource, code])?;
        let value = self.get_value(url, &format!("{resource} {code}"))?;
        Ok(value
            .get(field)
            .map(text_of)
            .filter(|name| !name.trim().is_empty()))
    }

    fn search_url(&self, resource: &str) -> Result<Url, LookupError> {
        self.endpoint(&[resource, "search"])
    }
}

impl Lookup for Client {
    fn ping(&self) -> Result<(), LookupError> {
        let url = self.endpoint(&["health"])?;
        let value = self.get_value(url, "health reply")?;
        if value.get("ok").and_then(Value::as_bool) != Some(true) {
            return Err(LookupError::Decode {
                what: "health reply".to_owned(),
                message: format!("backend did not report ok: {value}"),
            });
        }
        Ok(())
    }

    fn customer_name(&self, code: &str) -> Result<Option<String>, LookupError> {
        self.name("customers", code, "customer_name")
    }

    fn ship_to_name(&self, code: &str) -> Result<Option<String>, LookupError> {
        self.name("shipto", code, "shipto_name")
    }

    fn maker_name(&self, code: &str) -> Result<Option<String>, LookupError> {
        self.name("makers", code, "maker_name")
    }

    fn product(&self, code: &str) -> Result<ProductRecord, LookupError> {
        let code = required(code, "products")?;
        let url = self.endpoint(&["products", code])?;
        let value = self.get_value(url, &format!("product {code}"))?;
        let mut record: ProductRecord = from_value(value, "product record")?;
        if record.product_code.trim().is_empty() {
            record.product_code = code.to_owned();
        }
        Ok(record)
    }

    fn unit_options(&self, product_code: &str) -> Result<Vec<UnitOption>, LookupError> {
        let product_code = required(product_code, "units")?;
        let mut url = self.endpoint(&["products", "units"])?;
        url.query_pairs_mut().append_pair("product_cd", product_code);
        let value = self.get_value(url, "unit options")?;
        normalize_units(value)
    }

    fn resolve_price(&self, key: &PricingKey) -> Result<PriceQuote, LookupError> {
        let url = self.endpoint(&["pricing", "resolve"])?;
        let value = self.post_value(url, key, "price quote")?;
        from_value(value, "price quote")
    }

    fn search_parties(
        &self,
        target: PartyTarget,
        query: &str,
    ) -> Result<Vec<PartyHit>, LookupError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let resource = match target {
            PartyTarget::Customer => "customers",
            PartyTarget::ShipTo => "shipto",
            PartyTarget::Maker => "makers",
        };
        let mut url = self.search_url(resource)?;
        url.query_pairs_mut().append_pair("q", query);
        let value = self.get_value(url, &format!("{} search", target.as_str()))?;
        list_of(value)
            .into_iter()
            .map(|item| from_value(item, "search hit"))
            .collect()
    }

    fn search_products(&self, query: &ProductSearch) -> Result<Vec<ProductRecord>, LookupError> {
        let mut url = self.search_url("products")?;
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in [
                ("maker_cd", &query.maker_code),
                ("maker_name", &query.maker_name),
                ("maker_part_no", &query.part_number),
                ("product_name", &query.product_name),
                ("spec", &query.spec),
            ] {
                let value = value.trim();
                if !value.is_empty() {
                    pairs.append_pair(name, value);
                }
            }
            pairs.append_pair("limit", &query.limit.clamp(1, 2000).to_string());
        }
        let value = self.get_value(url, "product search")?;
        list_of(value)
            .into_iter()
            .map(|item| from_value(item, "product hit"))
            .collect()
    }

    fn generate_document(
        &self,
        payload: &DocumentPayload,
    ) -> Result<GeneratedDocument, LookupError> {
        let url = self.endpoint(&["orders", "pdf_v2"])?;
        let response = self.send("POST", &url, self.http.post(url.clone()).json(payload))?;
        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(disposition_filename);
        let bytes = response.bytes().map_err(|error| LookupError::Decode {
            what: "document body".to_owned(),
            message: error.to_string(),
        })?;
        Ok(GeneratedDocument {
            filename,
            bytes: bytes.to_vec(),
        })
    }
}

fn required<'a>(code: &'a str, what: &str) -> Result<&'a str, LookupError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(LookupError::InvalidRequest(format!("{what} lookup needs a code")));
    }
    Ok(code)
}

fn decode(response: Response, what: &str) -> Result<Value, LookupError> {
    let text = response.text().map_err(|error| LookupError::Decode {
        what: what.to_owned(),
        message: error.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|error| LookupError::Decode {
        what: what.to_owned(),
        message: error.to_string(),
    })
}

fn from_value<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, LookupError> {
    serde_json::from_value(value).map_err(|error| LookupError::Decode {
        what: what.to_owned(),
        message: error.to_string(),
    })
}

/// Lists arrive bare or wrapped under one of a few envelope keys.
fn list_of(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut object) => ["items", "data", "rows", "result"]
            .into_iter()
            .find_map(|key| match object.remove(key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Unit options with a blank unit name are dropped.
pub fn normalize_units(value: Value) -> Result<Vec<UnitOption>, LookupError> {
    let mut options = Vec::new();
    for item in list_of(value) {
        if !item.is_object() {
            continue;
        }
        let option: UnitOption = from_value(item, "unit option")?;
        if !option.unit_name.trim().is_empty() {
            options.push(option);
        }
    }
    Ok(options)
}

/// `filename*=UTF-8''...` wins over a plain `filename=`; both are
/// percent-decoded.
pub fn disposition_filename(header: &str) -> Option<String> {
    let mut plain = None;
    for part in header.split(';') {
        let Some((name, value)) = part.trim().split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        match name.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = value.split_once("''").map_or(value, |(_, rest)| rest);
                let decoded = percent_decode(encoded);
                if !decoded.trim().is_empty() {
                    return Some(decoded);
                }
            }
            "filename" => plain = Some(percent_decode(value)),
            _ => {}
        }
    }
    plain.filter(|name| !name.trim().is_empty())
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%'
            && let Some(hex) = bytes.get(index + 1..index + 3)
            && hex.iter().all(u8::is_ascii_hexdigit)
            && let Ok(byte) = u8::from_str_radix(&String::from_utf8_lossy(hex), 16)
        {
            out.push(byte);
            index += 3;
            continue;
        }
        out.push(bytes[index]);
        index += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn connection_error(base_url: &str, error: reqwest::Error) -> LookupError {
    LookupError::Unreachable {
        url: base_url.to_owned(),
        message: error.to_string(),
    }
}

/// FastAPI errors come as `{"detail": ...}`; anything else is passed through
/// trimmed.
fn clean_body(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<Value>(body)
        && let Some(detail) = parsed.get("detail")
    {
        return text_of(detail);
    }
    body.trim().to_owned()
}
