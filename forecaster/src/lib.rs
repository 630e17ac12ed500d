pub mod config;
pub mod errors;
pub mod forecast;
pub mod insight;
pub mod jobs;
pub mod model;
pub mod store;
pub mod validate;
