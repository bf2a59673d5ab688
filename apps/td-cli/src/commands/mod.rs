pub mod archive;
pub mod audit;
pub mod config;
pub mod sequence;
pub mod transcript;
