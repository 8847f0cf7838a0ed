//! # convoy-core
//!
//! The position-synchronisation and session-lifecycle engine of a convoy.
//!
//! - [`geo_filter`] decides when a position sample is worth publishing.
//! - [`trail`] turns the leader's samples into a trail and splits it at
//!   coverage gaps.
//! - [`roster`] enforces join rules, assigns colours, flags ghosts and
//!   orders the participant list.
//! - [`lifecycle`] joins, runs and tears down a session.
//! - [`annotations`] manages host-placed notes.
//! - [`camera`] reconciles auto-follow with user map interaction.
//! - [`position`] and [`simulation`] provide the samples.
//! - [`client`] wires all of the above into one event loop.

pub mod annotations;
pub mod camera;
pub mod client;
pub mod config;
pub mod error;
pub mod geo_filter;
pub mod lifecycle;
pub mod position;
pub mod roster;
pub mod simulation;
pub mod trail;

pub use client::{ClientCommand, ClientEvent, ClientOptions, ConvoyClient, SessionEnd};
pub use config::Tuning;
pub use error::{ConvoyError, PositionSourceError, Result, SimulationSetupError, ValidationError};
pub use geo_filter::{GeoFilter, RawSample, SampleOrigin};
pub use lifecycle::{JoinRequest, Phase, Role, SessionLifecycle};
pub use position::{ActiveSource, DeviceFeed, DeviceStream, PositionSource, RouteReplay};
pub use simulation::{Gazetteer, RouteProvider, SimulationRequest};
pub use trail::{TrailBuilder, TrailSegment};
