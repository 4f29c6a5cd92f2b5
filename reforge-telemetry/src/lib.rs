pub mod logging;
pub mod reentrancy;

pub use logging::init;
pub use reentrancy::{guarded, is_inside_sdk};
