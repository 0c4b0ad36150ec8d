pub mod keys;
pub mod wait;
