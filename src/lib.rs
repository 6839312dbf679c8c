//! Email Waterfall Enrichment Library
//!
//! Finds a verified, deliverable work email for each contact by cascading
//! through several data providers: validate the contact's own address, ask
//! finders in order, double-check risky results, then resolve the mail host.
//!
//! # Modules
//!
//! - `api`: HTTP-facing components.
//! - `core`: Waterfall state machine, orchestration and shared models.
//! - `integrations`: Vendor clients and their HTTP plumbing.
//! - `batch`: Ordered batch runner and run summary.
//! - `circuit_breaker`: Per-provider circuit breaker.
//! - `cli`: Command-line arguments.
//! - `config`: Configuration management.
//! - `credentials`: Provider API keys.
//! - `enrichment`: Per-contact orchestration.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `models`: Contacts, verdicts and outcomes.
//! - `normalize`: First-name and company-name cleaning.
//! - `pacing`: Outbound call pacing and rate-limit retry.
//! - `provider_client`: Shared vendor HTTP call.
//! - `records`: Contact CSV input/output.
//! - `registry`: Provider capabilities and registry.
//! - `server`: Axum router and server.
//! - `services`: Vendor clients (TryKit, LeadMagic, Icypeas, MillionVerifier, BounceBan, EmailGuard).
//! - `waterfall`: Pure stage transition function.

pub mod api;
pub mod core;
pub mod integrations;

pub mod batch;
pub mod circuit_breaker;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod enrichment;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod normalize;
pub mod pacing;
pub mod provider_client;
pub mod records;
pub mod registry;
pub mod server;
pub mod services;
pub mod waterfall;
