mod buffer;
mod coordinator;
mod participant;
mod registry;
mod settings;
mod state;
mod status;

pub use buffer::{BufferedUpdate, UpdateBuffer};
pub use coordinator::{CloseErr, Coordinator, Deadline, Rejection, Submission, Update};
pub use participant::{Participant, ParticipantId, ParticipantSink};
pub use registry::Registry;
pub use settings::{CoordinatorSettings, TimeoutPolicy};
pub use status::{Phase, RoundStatus};
