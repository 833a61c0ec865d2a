// src/utils/mod.rs
pub mod clock;
pub mod crypto;
pub mod format;
pub mod serialization;
