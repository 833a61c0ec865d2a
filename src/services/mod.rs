// src/services/mod.rs
pub mod api_server;
pub mod credential_issuer;
pub mod event_catalog;
pub mod organizer;
pub mod verifier;
