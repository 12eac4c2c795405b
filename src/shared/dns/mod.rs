mod class;
mod edns;
mod errors;
mod header;
mod message;
mod name;
mod questions;
mod records;
mod types;
mod utils;

pub use class::*;
pub use edns::{Edns, EdnsOption, EDNS_ADVERTISED_PAYLOAD_SIZE, OPT_TARGET_VIEW, OPT_TARGET_ZONE};
pub use errors::*;
pub use header::*;
pub use message::*;
pub use name::*;
pub use questions::*;
pub use records::*;
pub use types::*;
pub use utils::*;
