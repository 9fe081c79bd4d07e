//! Raw TCP endpoints for the router mesh's TCP listeners and connectors.
//!
//! The server answers every connection with one greeting line and hangs up.
//! The client keeps reconnecting and randomly drops, talks, or waits for the
//! greeting, so the routers see a steady churn of short-lived flows.

pub mod client;
pub mod server;

pub use client::{connect_once, run_client, ClientBehavior};
pub use server::{serve, WELCOME};
