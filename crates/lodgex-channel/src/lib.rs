//! Channel-manager client for lodgex.
//!
//! The external booking/PMS provider is an opaque, read-only HTTP data
//! source. This crate holds the per-property configuration, the
//! [`ChannelSource`] trait the engines consume, its reqwest-backed
//! implementation, and the normalization boundary that maps the
//! provider's loosely-shaped JSON into canonical records before any
//! business logic runs.

pub mod client;
pub mod config;
pub mod error;
pub mod normalize;
pub mod types;

pub use client::{ChannelSource, HttpChannelSource};
pub use config::{ChannelConfig, Property, PropertyDirectory, RoomMapping};
pub use error::{ChannelError, ChannelResult};
pub use types::{RawCustomer, RawExtra, RawNote, RawPayment, RawReservation, RawRoomStay};
