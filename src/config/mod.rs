mod model;
mod store;
mod validate;

pub use model::{ChangeEvent, CredentialRef, IntegrationConfig};
pub use store::{ConfigError, ConfigStore};
pub use validate::validate;
