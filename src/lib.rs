//! Compromise-resilient link-layer security core for IEEE 802.15.4 mesh
//! neighbors: the APKES handshake, EBEAP broadcast authentication, a dense
//! bounded neighbor table, and the Trickle-driven bootstrap scheduler.
//!
//! The four protocol pieces are deliberately small and composed through
//! [`dispatcher::Core`], the single ingress/egress funnel a network stack
//! drives. Everything below it (AES-128, CCM*, the PRNG, persistent key
//! storage, the MAC driver) is an external collaborator, specified in
//! [`collaborators`] as traits rather than owned implementations.

pub mod addr;
pub mod apkes;
pub mod collaborators;
pub mod config;
pub mod dispatcher;
pub mod ebeap;
pub mod error;
pub mod frame;
pub mod keying;
pub mod neighbor;
pub mod replay;
pub mod trickle;

pub use dispatcher::{Core, Destination};
pub use error::{CoreError, Result};
