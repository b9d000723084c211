/// Kora HMI Library
/// 
/// Shared modules for the operator dashboard

pub mod config_loader;
pub mod gateway;
pub mod gauge;
pub mod poller;
pub mod dashboard;

#[cfg(test)]
mod testing;
