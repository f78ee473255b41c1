pub mod core;
pub mod distribution;
pub mod domain;
pub mod http;
pub mod issuance;
pub mod lifecycle;
pub mod listener;
pub mod secrets;
