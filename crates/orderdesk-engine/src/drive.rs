// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::VecDeque;

use anyhow::Result;
use orderdesk_app::{DraftStorage, Lookup};

use crate::session::OrderSession;
use crate::ticket::{Ticket, execute};

/// Runs tickets first-in first-out on the calling thread, feeding each
/// completion's follow-ups to the back of the queue. Every ticket passed in
/// is already outstanding, so guards see overlapping requests exactly as
/// they would with a concurrent driver. Returns how many lookups ran.
pub fn drain<S: DraftStorage>(
    session: &mut OrderSession<S>,
    lookup: &dyn Lookup,
    tickets: Vec<Ticket>,
) -> Result<usize> {
    let mut queue: VecDeque<Ticket> = tickets.into();
    let mut completed = 0;
    while let Some(ticket) = queue.pop_front() {
        let outcome = execute(lookup, &ticket.request);
        completed += 1;
        queue.extend(session.complete(ticket, outcome)?);
    }
    Ok(completed)
}
