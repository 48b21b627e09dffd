pub mod system_data;
pub mod time;

pub use system_data::{SystemData, SystemProfile};
