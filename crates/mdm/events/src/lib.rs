//! MDM Event Bus
//!
//! In-process topic publish/subscribe decoupling storage writers from
//! asynchronous consumers (push dispatch, enrollment sync).
//!
//! Delivery is at-most-once per process lifetime: events are not persisted,
//! publishing never waits on subscribers, and a subscriber that falls more
//! than `capacity` events behind loses the oldest ones.

mod bus;
mod event;

pub use bus::*;
pub use event::*;
