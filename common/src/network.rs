pub mod ip;
pub mod range;
pub mod target;
