pub mod config;
pub mod details;
pub mod error;
pub mod gate;
pub mod interpret;
pub mod outcome;
pub mod request;
pub mod sink;
pub mod transport;
