//! MDM Push Notifications
//!
//! Wakes devices over APNs when a command is created for them.

mod apns;
mod coordinator;
mod traits;

pub use apns::*;
pub use coordinator::*;
pub use traits::*;
