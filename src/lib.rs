pub mod config;
pub mod data;
pub mod error;
pub mod observations;
pub mod periodic;
pub mod registry;
pub mod system;
pub mod testing;
pub mod upload;
pub mod util;
