pub mod config;
pub mod generate;
pub mod ping;
pub mod serve;
pub mod session;
