pub mod server;

pub use server::BalancerServer;
