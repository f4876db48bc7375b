pub mod keys;
pub mod transfer;
pub mod types;
