//! MDM Crypto Utilities
//!
//! Certificate hashing and the enrollment-program keypair.

mod cert;
mod keypair;

pub use cert::*;
pub use keypair::*;
