mod audit;
mod base;

pub use audit::*;
pub use base::*;
