//! Where GPS data comes from: procedurally generated routes and rides simulated over them.

mod procedural;

pub use procedural::{Pause, RideConfig, RideSimulator, RouteConfig, RouteGenerator};
