//! proctor-session: tokio composition root for the integrity subsystem.
//! Wires the pure state machines to the anchor store and the external
//! collaborators, and owns every timer and listener for the session.

pub mod collab;
pub mod controller;
pub mod http;

pub use proctor_core::types;
