// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod draft;
pub mod forms;
pub mod grid;
pub mod ids;
pub mod lookup;
pub mod model;
pub mod popup;
pub mod selection;
pub mod state;
pub mod wire;

pub use draft::*;
pub use forms::*;
pub use grid::*;
pub use ids::*;
pub use lookup::*;
pub use model::*;
pub use popup::*;
pub use selection::*;
pub use state::*;
