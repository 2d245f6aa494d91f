//! Shared datastore backend test infrastructure
//!
//! The same test logic runs against every `Datastore` implementation:
//!
//! - **Memory / SQLite**: fast, in-process tests that run with every `cargo test`
//! - **PostgreSQL**: testcontainers-backed tests, run with `cargo test -- --ignored`
//!
//! Each test is an async function taking a [`conformance::DatastoreTestContext`],
//! instantiated per backend by the `memory_test!`, `sqlite_test!` and
//! `postgres_test!` macros.
