#[macro_use]
extern crate tracing;

pub mod cmd;
pub mod constants;
pub mod errors;
pub mod fs;
pub mod io_models;
pub mod logger;
pub mod models;
pub mod provisioning;
pub mod services;
mod template;
pub mod validation;
