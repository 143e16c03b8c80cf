//! End-to-end scenarios against the in-memory market.
//!
//! Everything here goes through the public `LeverageEngine` surface;
//! faults are injected through the shared `InMemoryMarket` handles.

mod fixture;

mod atomicity;
mod concurrency;
mod estimation;
mod execution;
mod registry;
