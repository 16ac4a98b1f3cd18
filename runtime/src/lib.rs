// Copyright 2026 Tagger Contributors
// SPDX-License-Identifier: Apache-2.0

//! Itinerary auto-tagger runtime.
//!
//! Finds the "Day N" blocks of an itinerary editor page, works out where each
//! day ends, and fills the day's destination field through the page's own
//! autocomplete. The library crate exposes the core modules for integration
//! testing; the `tagger` binary wires them to Chromium and the control
//! surfaces.

#![allow(clippy::new_without_default)]

pub mod background;
pub mod cli;
pub mod config;
pub mod controller;
pub mod dom;
pub mod error;
pub mod events;
pub mod page;
pub mod protocol;
pub mod renderer;
pub mod rest;
pub mod server;
pub mod settings;
pub mod tagger;
