use std::io;

/// Writes `self` as an opaque blob, the framing is added by the `FrameSender`.
pub trait Serialize {
    fn serialize(&self, buf: &mut Vec<u8>) -> io::Result<()>;
}

impl Serialize for [u8] {
    fn serialize(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        buf.extend_from_slice(self);
        Ok(())
    }
}

impl Serialize for Vec<u8> {
    fn serialize(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        self.as_slice().serialize(buf)
    }
}
