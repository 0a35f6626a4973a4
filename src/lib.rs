pub mod aggregate;
pub mod cli;
pub mod decode;
pub mod error;
pub mod fetch;
pub mod geometry;
pub mod output;
pub mod stats;
