use std::io;

/// Rebuilds a value out of the exact blob carried by one frame.
pub trait Deserialize: Sized {
    fn deserialize(buf: &[u8]) -> io::Result<Self>;
}

impl Deserialize for Vec<u8> {
    fn deserialize(buf: &[u8]) -> io::Result<Self> {
        Ok(buf.to_vec())
    }
}
