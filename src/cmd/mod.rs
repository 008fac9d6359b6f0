pub mod ansible;
pub mod command;
pub mod container_runtime;
pub mod oc;
pub mod structs;
