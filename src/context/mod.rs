//! Native context acquisition and lifecycle.

mod data;
mod manager;
mod params;

pub use data::ExposedContextData;
pub use manager::NativeContextManager;
pub use params::ContextCreationParams;
