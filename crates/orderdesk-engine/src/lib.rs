// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod drive;
pub mod session;
pub mod ticket;

pub use drive::drain;
pub use session::{
    IssuedDocument, OrderSession, PricingPolicy, Restored, SessionConfig, demo_seed_rows,
};
pub use ticket::{ErrorRoute, Reply, Request, Ticket, execute};
