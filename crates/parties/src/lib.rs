//! `devisio-parties`: the billed party.

pub mod client;

pub use client::{BillingAddress, Client};
