//! Enrollment-program integration.
//!
//! Pulls device batches from the enrollment feed with a resumable cursor,
//! auto-assigns newly discovered devices, and manages the program's
//! credentials and keypair.

mod client;
mod sync;
mod token;

pub use client::*;
pub use sync::*;
pub use token::*;
