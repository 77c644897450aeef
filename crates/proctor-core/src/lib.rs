//! proctor-core: pure state machines for the session integrity and timing
//! subsystem. No IO, no async, no system clock access — every transition
//! takes the current time as a parameter so the runtime layer owns all
//! side effects.

pub mod clock;
pub mod guard;
pub mod lock;
pub mod monitor;
pub mod types;
