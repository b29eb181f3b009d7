//! End-to-end cycle tests against in-memory exchanges, an in-memory
//! SQLite store and a recording notifier. No network access.

mod mock_exchange;
mod simulation;
