//! lanea - the Lane A knowledge governance core for an AI-assisted software
//! delivery platform: staleness policy, committee orchestration, the
//! sufficiency ledger, the phase/meeting state machine, decision packets,
//! the work status checkpoint, and the delivery gate.
//!
//! This crate is a thin composition root. Every operation lives in its own
//! `lanea-*` workspace member; `lanea-cli` wires them together behind a
//! command-line surface, and this crate just re-exports that surface for
//! the `lanea` binary.

pub use lanea_cli::{run, Cli, Commands};
