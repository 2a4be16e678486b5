pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod explorer;
pub mod gate;
pub mod http;
pub mod net;

pub use bus::{Bus, BusHandle, Event};
pub use config::ProxyConfig;
pub use engine::Engine;
pub use error::{Error, Result};
pub use gate::Gate;
pub use http::HttpMessage;
