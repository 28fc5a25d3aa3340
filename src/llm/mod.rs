pub mod client;
pub mod tools;
