//! Query server and command-line front end for `pv`.
//!
//! [`server`] exposes the two-phase valuation workflow over HTTP,
//! [`site::SiteBackend`] drives the valuation website, and [`commands`]
//! wires both to the `pv` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod server;
pub mod site;
pub mod styles;
