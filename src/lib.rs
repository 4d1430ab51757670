pub mod consts;
pub mod error;
pub mod finder;
pub mod model;
pub mod orchestrator;
pub mod protocol;
pub mod sentence;
pub mod server;
