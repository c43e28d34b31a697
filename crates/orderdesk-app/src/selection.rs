// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Return path from picker windows. A picker posts exactly one tagged message
//! to its opener; the opener only honours messages from its own origin.

use std::sync::mpsc::Sender;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::{Origin, Url};

use crate::ids::RowId;
use crate::lookup::{PartyHit, PartyTarget};
use crate::model::ProductRecord;
use crate::wire;

/// A raw cross-window delivery: the sender's origin plus the posted data.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub origin: String,
    pub data: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerPick {
    #[serde(default, rename = "tcode", deserialize_with = "wire::text")]
    pub code: String,
    #[serde(
        default,
        rename = "customer_name",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "wire::optional_text"
    )]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipToPick {
    #[serde(default, rename = "jcode", deserialize_with = "wire::text")]
    pub code: String,
    #[serde(
        default,
        rename = "shipto_name",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "wire::optional_text"
    )]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakerPick {
    #[serde(
        default,
        rename = "maker_cd",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "wire::optional_text"
    )]
    pub code: Option<String>,
    #[serde(
        default,
        rename = "maker_name",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "wire::optional_text"
    )]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPick {
    #[serde(
        default,
        rename = "product_cd",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "wire::optional_text"
    )]
    pub code: Option<String>,
    #[serde(
        default,
        rename = "product_name",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "wire::optional_text"
    )]
    pub name: Option<String>,
    #[serde(
        default,
        rename = "maker_part_no",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "wire::optional_text"
    )]
    pub part_number: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "wire::optional_text"
    )]
    pub spec: Option<String>,
    #[serde(
        default,
        rename = "maker_cd",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "wire::optional_text"
    )]
    pub maker_code: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "wire::optional_text"
    )]
    pub maker_name: Option<String>,
}

impl From<&ProductRecord> for ProductPick {
    fn from(record: &ProductRecord) -> Self {
        Self {
            code: Some(record.product_code.clone()),
            name: record.product_name.clone(),
            part_number: record.part_number.clone(),
            spec: record.spec.clone(),
            maker_code: record.maker_code.clone(),
            maker_name: record.maker_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SelectionMessage {
    #[serde(rename = "CUSTOMER_SELECTED")]
    CustomerSelected {
        #[serde(default)]
        customer: CustomerPick,
    },
    #[serde(rename = "SHIPTO_SELECTED")]
    ShipToSelected {
        #[serde(default)]
        shipto: ShipToPick,
    },
    #[serde(rename = "MAKER_SELECTED")]
    MakerSelected {
        #[serde(default, deserialize_with = "wire::text")]
        row_id: String,
        #[serde(default)]
        maker: MakerPick,
    },
    #[serde(rename = "PRODUCT_SELECTED")]
    ProductSelected {
        #[serde(default, deserialize_with = "wire::text")]
        row_id: String,
        #[serde(default)]
        product: ProductPick,
    },
}

const KNOWN_KINDS: [&str; 4] = [
    "CUSTOMER_SELECTED",
    "SHIPTO_SELECTED",
    "MAKER_SELECTED",
    "PRODUCT_SELECTED",
];

impl SelectionMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CustomerSelected { .. } => KNOWN_KINDS[0],
            Self::ShipToSelected { .. } => KNOWN_KINDS[1],
            Self::MakerSelected { .. } => KNOWN_KINDS[2],
            Self::ProductSelected { .. } => KNOWN_KINDS[3],
        }
    }

    /// Row the message targets; `None` for header messages or an id that
    /// cannot name any row.
    pub fn target_row(&self) -> Option<RowId> {
        match self {
            Self::MakerSelected { row_id, .. } | Self::ProductSelected { row_id, .. } => {
                RowId::parse(row_id)
            }
            Self::CustomerSelected { .. } | Self::ShipToSelected { .. } => None,
        }
    }
}

/// Opener-side filter: same-origin check, then decode by kind tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChannel {
    origin: Origin,
}

impl SelectionChannel {
    pub fn new(page_url: &str) -> Result<Self> {
        let url = Url::parse(page_url)
            .with_context(|| format!("parse page origin {page_url:?} -- use a URL like http://localhost:8000"))?;
        let origin = url.origin();
        if !origin.is_tuple() {
            bail!("page origin {page_url:?} is opaque -- use an http(s) URL");
        }
        Ok(Self { origin })
    }

    pub fn origin(&self) -> String {
        self.origin.ascii_serialization()
    }

    /// `Ok(None)` means the message was ignored: foreign origin, no kind tag,
    /// or a kind this opener does not handle. A known kind with a malformed
    /// body is an error.
    pub fn accept(&self, message: &InboundMessage) -> Result<Option<SelectionMessage>> {
        let same_origin = Url::parse(&message.origin)
            .map(|url| url.origin() == self.origin)
            .unwrap_or(false);
        if !same_origin {
            tracing::debug!(origin = %message.origin, "discarding message from foreign origin");
            return Ok(None);
        }

        let Some(kind) = message.data.get("type").and_then(Value::as_str) else {
            tracing::debug!("ignoring message without a kind tag");
            return Ok(None);
        };
        if !KNOWN_KINDS.contains(&kind) {
            tracing::debug!(kind, "ignoring message of unknown kind");
            return Ok(None);
        }

        let decoded = serde_json::from_value(message.data.clone())
            .with_context(|| format!("decode {kind} message"))?;
        Ok(Some(decoded))
    }
}

/// Customer and ship-to share one picker; the mode is picked once when the
/// window opens.
#[derive(Debug, Clone, Copy)]
pub struct PartySearchMode {
    pub target: PartyTarget,
    pub param: &'static str,
    pub title: &'static str,
    pub window_name: &'static str,
    select: fn(&PartyHit) -> SelectionMessage,
}

pub const CUSTOMER_SEARCH: PartySearchMode = PartySearchMode {
    target: PartyTarget::Customer,
    param: "customer",
    title: "得意先検索",
    window_name: "customer_search",
    select: customer_selection,
};

pub const SHIP_TO_SEARCH: PartySearchMode = PartySearchMode {
    target: PartyTarget::ShipTo,
    param: "shipto",
    title: "需要先検索",
    window_name: "shipto_search",
    select: ship_to_selection,
};

fn customer_selection(hit: &PartyHit) -> SelectionMessage {
    SelectionMessage::CustomerSelected {
        customer: CustomerPick {
            code: hit.code.clone(),
            name: Some(hit.name.clone()),
        },
    }
}

fn ship_to_selection(hit: &PartyHit) -> SelectionMessage {
    SelectionMessage::ShipToSelected {
        shipto: ShipToPick {
            code: hit.code.clone(),
            name: Some(hit.name.clone()),
        },
    }
}

impl PartySearchMode {
    /// Anything other than `shipto` opens the customer picker.
    pub fn from_param(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case(SHIP_TO_SEARCH.param) {
            SHIP_TO_SEARCH
        } else {
            CUSTOMER_SEARCH
        }
    }

    pub fn selection(&self, hit: &PartyHit) -> SelectionMessage {
        (self.select)(hit)
    }
}

/// The picker side of an opened window. Holds the opener capability handed
/// over at launch; selecting consumes the window, so it can post once.
#[derive(Debug)]
pub struct PickerWindow {
    origin: String,
    row_id: Option<RowId>,
    opener: Sender<InboundMessage>,
}

impl PickerWindow {
    pub fn new(origin: String, row_id: Option<RowId>, opener: Sender<InboundMessage>) -> Self {
        Self {
            origin,
            row_id,
            opener,
        }
    }

    pub fn row_id(&self) -> Option<RowId> {
        self.row_id
    }

    pub fn select_party(self, mode: &PartySearchMode, hit: &PartyHit) -> Result<()> {
        let message = mode.selection(hit);
        self.post(&message)
    }

    pub fn select_maker(self, hit: &PartyHit) -> Result<()> {
        let message = SelectionMessage::MakerSelected {
            row_id: self.row_param(),
            maker: MakerPick {
                code: Some(hit.code.clone()),
                name: Some(hit.name.clone()),
            },
        };
        self.post(&message)
    }

    pub fn select_product(self, record: &ProductRecord) -> Result<()> {
        let message = SelectionMessage::ProductSelected {
            row_id: self.row_param(),
            product: ProductPick::from(record),
        };
        self.post(&message)
    }

    fn row_param(&self) -> String {
        self.row_id.map(|id| id.to_string()).unwrap_or_default()
    }

    fn post(self, message: &SelectionMessage) -> Result<()> {
        let data = serde_json::to_value(message).context("encode selection message")?;
        self.opener
            .send(InboundMessage {
                origin: self.origin,
                data,
            })
            .map_err(|_| anyhow!("the order window is gone -- reopen the picker from the order"))
    }
}
