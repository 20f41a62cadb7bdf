pub mod config;
pub mod event;
pub mod transport;

pub use config::MurmurConfig;
pub use event::{unix_now, ChatEvent};
pub use transport::{ChatTransport, Presence};
