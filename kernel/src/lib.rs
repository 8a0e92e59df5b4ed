//! Strata Kernel - versioned data kernel with branched-mutation concurrency.
//!
//! Generic items with typed attributes and typed linkages, layered over a
//! version-controlled SQL store. Every write runs as a branched mutation:
//! forked onto its own ephemeral branch, executed in isolation, committed,
//! then merged back into the trunk under a store-wide lock.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// REST front end.
pub mod api;
/// Items, typed attributes and typed linkages.
pub mod catalog;
/// Infrastructure components (config, server, telemetry, audit).
pub mod infrastructure;
/// Agent-tool (MCP) front end.
pub mod mcp;
/// Branched-mutation concurrency core.
pub mod mutation;
/// Versioned store client.
pub mod store;
