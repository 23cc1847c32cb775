use std::{
    fmt::{self, Display},
    io,
    net::SocketAddr,
};

use async_trait::async_trait;
use comms::{FrameSender, msg::Msg};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;

/// The identity the coordinator issues to a participant when it first shows up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(u64);

impl ParticipantId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// The sending half of a participant's connection, as seen by the coordinator.
#[async_trait]
pub trait ParticipantSink: Send {
    /// Writes `msg` to the participant.
    async fn deliver(&mut self, msg: &Msg<'_>) -> io::Result<()>;
}

#[async_trait]
impl<W> ParticipantSink for FrameSender<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn deliver(&mut self, msg: &Msg<'_>) -> io::Result<()> {
        self.send(msg).await
    }
}

/// A registered participant and its transient connection.
pub struct Participant {
    id: ParticipantId,
    addr: Option<SocketAddr>,
    sink: Option<Box<dyn ParticipantSink>>,
}

impl Participant {
    /// Creates a new `Participant`.
    ///
    /// # Arguments
    /// * `id` - Its identity.
    /// * `addr` - The remote address, if it connected over the network.
    /// * `sink` - Where broadcasts for it are written, `None` if it has no open connection.
    pub fn new(
        id: ParticipantId,
        addr: Option<SocketAddr>,
        sink: Option<Box<dyn ParticipantSink>>,
    ) -> Self {
        Self { id, addr, sink }
    }

    pub fn id(&self) -> ParticipantId {
        self.id
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    pub fn attach(&mut self, sink: Box<dyn ParticipantSink>) {
        self.sink = Some(sink);
    }

    pub fn sink_mut(&mut self) -> Option<&mut (dyn ParticipantSink + 'static)> {
        self.sink.as_deref_mut()
    }
}
