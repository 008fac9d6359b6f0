pub mod context;
pub mod details;
pub mod env_file;
pub mod workshop;
