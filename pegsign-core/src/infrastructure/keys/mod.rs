pub mod file_key;
pub mod secret;

pub use file_key::KeyFileSigner;
pub use secret::SecretBytes;
