pub mod secrets;

pub use secrets::SecretStore;
