pub mod bytes;
pub mod calldata;
pub mod crypto;
