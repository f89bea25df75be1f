pub mod api;
pub mod dashboard;
pub mod model;
pub mod normalize;
pub mod session;
pub mod settings;

pub use api::Error;
pub use dashboard::{Dashboard, DataOutcome};
