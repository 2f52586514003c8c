// A client-side SIP REGISTER dialog in Rust

pub mod dialog;
pub mod error;
pub mod rsip_ext;
pub mod transaction;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
