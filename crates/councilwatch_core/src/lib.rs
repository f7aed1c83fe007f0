pub mod config;
pub mod fetch;
pub mod model;
pub mod normalize;
pub mod parse;
pub mod pipeline;
pub mod store;
