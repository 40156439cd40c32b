mod resolver;

pub use resolver::{Rotation, SecretResolver};
