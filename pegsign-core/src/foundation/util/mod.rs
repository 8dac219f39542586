pub mod encoding;
pub mod hashing;
pub mod hex_fmt;

pub use encoding::*;
pub use hashing::*;
pub use hex_fmt::*;
