// src/contracts/mod.rs
pub mod event_contract;
pub mod event_factory;
