pub mod animator;
pub mod api;
pub mod config;
pub mod error;
pub mod geo;
pub mod gtfs;
pub mod provider;
pub mod route;

pub use animator::{AnimationRun, AnimationState, AnimatorSettings, RouteAnimator, Snapshot, Status};
pub use geo::LatLng;
pub use route::{RoutePath, StopRecord};
