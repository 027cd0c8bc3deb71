// SPDX-License-Identifier: MIT

//! Pipeline router and its aggregated output

mod executor;
mod output;

pub use executor::{Pipeline, RunInput, DEFAULT_MAX_STEPS, FILEPATH_KEY};
pub use output::RunOutput;
