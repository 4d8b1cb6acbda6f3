pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod index;
pub mod input;
pub mod messages;
pub mod telemetry;
pub mod transport;
pub mod validation;
pub mod worker;
