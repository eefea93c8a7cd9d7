//! HTTP request handlers

pub mod health;
pub mod registration;

pub use health::health_handler;
pub use registration::{RegistrationForm, index_handler, submit_handler};
