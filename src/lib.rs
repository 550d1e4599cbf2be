//! Samsaya: a grounded research chat whose session lives in up to three stores at once.
//!
//! The session (agent name, persona, knowledge base, chat history, theme) is
//! kept in memory by a single [`sync::SessionCoordinator`] and written through
//! to a local SQLite key/value store plus, when configured, a Firestore
//! document store and a Supabase table. Stores are independent: any of them
//! may be missing or failing without affecting the others.
//!
//! # Reconciliation
//!
//! | Step | Behaviour |
//! |------|-----------|
//! | Startup | Local record read synchronously, defaults when absent or unreadable |
//! | Hydration | Every remote loaded concurrently, merged field by field in arrival order |
//! | Mutation | Debounced flush (2 s by default), only the trailing write performs I/O |
//! | Clear / new chat | Pending flush cancelled, empty history written immediately |
//!
//! # Modules
//!
//! - [`config`]: TOML configuration with environment overrides
//! - [`db`]: SQLite schema, migrations, and health checks for the local store
//! - [`session`]: session types, defaults, and the partial-record merge
//! - [`store`]: local, Firestore, and Supabase adapters
//! - [`sync`]: the coordinator, debounce timer, chat flow, and generated configuration
//! - [`llm`]: the model seam and the Gemini client
//! - [`identity`]: registered user / daily guest gate
//! - [`api`] and [`server`]: the HTTP surface

pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod identity;
pub mod llm;
pub mod server;
pub mod session;
pub mod store;
pub mod sync;
