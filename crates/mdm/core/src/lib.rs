//! MDM Core Types
//!
//! Entity types, the shared error enum and the storage codec for the fleet
//! management backend.
//! Architecture inspired by [nanomdm](https://github.com/micromdm/nanomdm).

mod blueprint;
mod checkin;
mod codec;
mod command;
mod dep;
mod device;
mod enrollment;
mod error;
mod profile;
mod push;
mod remove;
mod request;

pub use blueprint::*;
pub use checkin::*;
pub use codec::*;
pub use command::*;
pub use dep::*;
pub use device::*;
pub use enrollment::*;
pub use error::*;
pub use profile::*;
pub use push::*;
pub use remove::*;
pub use request::*;
