// SPDX-License-Identifier: PMPL-1.0-or-later
//
// PrintFlow Agent — core types, error taxonomy, and configuration shared
// across the spool engine and the HTTP front door.

pub mod config;
pub mod error;
pub mod types;

pub use config::AgentConfig;
pub use error::AgentError;
pub use types::*;
