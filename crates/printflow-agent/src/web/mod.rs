// SPDX-License-Identifier: PMPL-1.0-or-later
//
// The HTTP layer: request/response models and the Axum routes.

pub mod api;
pub mod models;
