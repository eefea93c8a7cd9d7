//! Web form and command-line front end for batch Smart Licensing
//! registration.

pub mod cli;
pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;
pub use routes::create_app;
