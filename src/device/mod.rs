pub mod btle;
pub mod connection;
pub mod constants;
pub mod decode;
pub mod link;
pub mod types;

#[cfg(test)]
pub mod testing;
