pub mod error;
pub mod http;
pub mod logging;
pub mod orchestrator;
pub mod output;
pub mod parsers;
pub mod registry;
pub mod resolver;
pub mod types;
