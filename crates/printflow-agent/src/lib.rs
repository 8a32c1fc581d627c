// SPDX-License-Identifier: PMPL-1.0-or-later
//
// PrintFlow Agent — HTTP front door for the local print spooler.

pub mod web;
