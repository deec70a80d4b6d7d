pub mod block;
pub mod clients;
pub mod profile;
pub mod retry;
pub mod rpc;
pub mod scanner;
pub mod trace;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;
