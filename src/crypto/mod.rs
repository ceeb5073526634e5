/// JOSE-level cryptographic glue: encodings, account keys, JWS signing
pub mod encoding;
pub mod jws;
pub mod keys;

pub use jws::{Jws, KeyBinding};
pub use keys::{AccountKey, JwsAlgorithm, MacKey};
