// SPDX-License-Identifier: MIT

pub mod pipeline;
