//! MDM Service Layer
//!
//! Device lifecycle: check-in handling and blueprint application.

mod lifecycle;
mod traits;

pub use lifecycle::*;
pub use traits::*;
