mod setup;
mod traits;
mod udp_server;

pub use setup::*;
pub use traits::*;
pub use udp_server::UdpParams;
