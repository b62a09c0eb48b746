pub mod account;
// Private so it does not clash with `application::billing` at the crate root.
mod billing;
pub mod build;
pub mod idea;
pub mod plan;

pub use account::*;
pub use billing::*;
pub use build::*;
pub use idea::*;
pub use plan::*;
