pub mod config;
pub mod geo;
pub mod geocode;
pub mod location;
pub mod overlay;
pub mod places;
pub mod telemetry;
pub mod template;
pub mod tracker;
