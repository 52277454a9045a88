pub mod clock;
pub mod config;
pub mod errors;

pub use clock::{Clock, SystemClock};
pub use self::config::*;
pub use errors::*;
