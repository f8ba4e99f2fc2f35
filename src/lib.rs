mod calibration;
mod config;
mod dataset;
mod geometry;
mod label;
mod normalize;
mod point_cloud;
mod raster;
mod target;

pub use calibration::*;
pub use config::*;
pub use dataset::*;
pub use geometry::*;
pub use label::*;
pub use normalize::*;
pub use point_cloud::*;
pub use raster::*;
pub use target::*;
