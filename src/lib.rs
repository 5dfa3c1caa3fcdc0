pub mod config;
pub mod credentials;
pub mod error;
pub mod http_client;
pub mod polling;
pub mod state;
pub mod synthesis;
pub mod workflow_client;
