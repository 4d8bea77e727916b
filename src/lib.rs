pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod geo;
pub mod metrics;
pub mod overpass;
pub mod plans;
pub mod travel;
