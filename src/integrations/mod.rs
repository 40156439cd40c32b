mod client;
mod http;
mod instance;
mod lifecycle;
mod mock;

pub use client::{ClientSink, IntegrationClient};
pub use instance::Instance;
pub use lifecycle::LifecycleManager;
