mod buffer;

pub use buffer::BitsBuffer;

/// Short alias used pervasively across the codec modules.
pub type BitsBuf = BitsBuffer;
