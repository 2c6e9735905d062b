//! Purpose: Library crate behind the `wirecall` CLI: declarative REST invocation.
//! Exports: `api` (client, manifests, wire values, errors).
//! Role: Compile service manifests once, then assemble, send, and decode calls.
//! Invariants: `api` is the public surface; `core` internals may change between releases.
//! Invariants: Engine state lives in a `ServiceClient`; there are no process-wide caches.
pub mod api;
pub(crate) mod core;
