// SPDX-License-Identifier: MIT

pub mod builder;
pub mod condition;
pub mod loader;
pub mod registry;
pub mod router;
pub mod sink;
pub mod stage;
pub mod types;
