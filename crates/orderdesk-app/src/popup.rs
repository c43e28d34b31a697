// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::sync::mpsc::Sender;

use anyhow::{Context, Result};
use thiserror::Error;
use url::Url;

use crate::ids::RowId;
use crate::selection::{CUSTOMER_SEARCH, InboundMessage, PickerWindow, SHIP_TO_SEARCH};
use crate::state::{StatusBoard, StatusCommand};

pub const DEFAULT_SCREEN_WIDTH: u32 = 1920;
pub const DEFAULT_SCREEN_HEIGHT: u32 = 1080;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerKind {
    Customer,
    ShipTo,
    Maker,
    Product,
}

impl PickerKind {
    const fn page(self) -> &'static str {
        match self {
            Self::Customer | Self::ShipTo => "customer_search.html",
            Self::Maker => "maker_search.html",
            Self::Product => "product_search.html",
        }
    }

    const fn window_name(self) -> &'static str {
        match self {
            Self::Customer => CUSTOMER_SEARCH.window_name,
            Self::ShipTo => SHIP_TO_SEARCH.window_name,
            Self::Maker => "maker_search",
            Self::Product => "product_search",
        }
    }

    const fn size(self) -> (u32, u32) {
        match self {
            Self::Product => (1200, 750),
            Self::Customer | Self::ShipTo | Self::Maker => (1100, 700),
        }
    }
}

/// What to open: the picker, the row it reports back to, and the initial
/// query (the maker code for product pickers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupRequest {
    pub kind: PickerKind,
    pub row_id: Option<RowId>,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    pub url: Url,
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub left: u32,
    pub top: u32,
}

impl WindowSpec {
    pub fn features(&self) -> String {
        format!(
            "width={},height={},left={},top={},resizable=yes,scrollbars=yes",
            self.width, self.height, self.left, self.top
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("popup blocked -- allow popups for the order page and retry")]
pub struct PopupBlocked;

/// Whatever can create a window. The picker capability is handed over at
/// creation and the launcher keeps no reference to the window afterwards.
pub trait WindowHost {
    fn open(&mut self, spec: &WindowSpec, window: PickerWindow) -> Result<(), PopupBlocked>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupLauncher {
    origin: Url,
    screen_width: u32,
    screen_height: u32,
}

impl PopupLauncher {
    pub fn new(origin: &str, screen_width: u32, screen_height: u32) -> Result<Self> {
        let origin = Url::parse(origin)
            .with_context(|| format!("parse popup origin {origin:?} -- use a URL like http://localhost:8000"))?;
        Ok(Self {
            origin,
            screen_width,
            screen_height,
        })
    }

    pub fn origin(&self) -> String {
        self.origin.origin().ascii_serialization()
    }

    pub fn window_spec(&self, request: &PopupRequest) -> Result<WindowSpec> {
        let mut url = self
            .origin
            .join(&format!("/{}", request.kind.page()))
            .context("build picker URL")?;
        let query = request.query.trim();
        let row_param = request.row_id.map(|id| id.to_string()).unwrap_or_default();
        {
            let mut pairs = url.query_pairs_mut();
            match request.kind {
                PickerKind::Customer | PickerKind::ShipTo => {
                    let mode = if request.kind == PickerKind::ShipTo {
                        SHIP_TO_SEARCH.param
                    } else {
                        CUSTOMER_SEARCH.param
                    };
                    pairs.append_pair("mode", mode);
                    if !query.is_empty() {
                        pairs.append_pair("q", query);
                    }
                }
                PickerKind::Maker => {
                    pairs.append_pair("row_id", &row_param);
                    if !query.is_empty() {
                        pairs.append_pair("q", query);
                    }
                }
                PickerKind::Product => {
                    pairs.append_pair("row_id", &row_param);
                    if !query.is_empty() {
                        pairs.append_pair("maker_cd", query);
                    }
                }
            }
        }

        let (width, height) = request.kind.size();
        Ok(WindowSpec {
            url,
            name: request.kind.window_name(),
            width,
            height,
            left: self.screen_width.saturating_sub(width) / 2,
            top: self.screen_height.saturating_sub(height) / 2,
        })
    }

    /// Returns whether a window was opened. A blocked popup lands on the
    /// error line and nothing else happens.
    pub fn launch(
        &self,
        host: &mut dyn WindowHost,
        board: &mut StatusBoard,
        request: &PopupRequest,
        opener: Sender<InboundMessage>,
    ) -> Result<bool> {
        let spec = self.window_spec(request)?;
        let window = PickerWindow::new(self.origin(), request.row_id, opener);
        match host.open(&spec, window) {
            Ok(()) => {
                tracing::debug!(url = %spec.url, name = spec.name, "picker opened");
                Ok(true)
            }
            Err(blocked) => {
                board.dispatch(StatusCommand::SetError(blocked.to_string()));
                Ok(false)
            }
        }
    }
}
