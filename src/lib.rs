pub mod nameserver;
pub mod shared;
