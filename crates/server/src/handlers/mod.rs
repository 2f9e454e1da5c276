pub mod keys;
pub mod secrets;
pub mod session;
