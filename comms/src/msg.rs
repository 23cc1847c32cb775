use std::{borrow::Cow, io};

use crate::{Deserialize, ParameterSet, Serialize};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();

const ERR_H: Header = 0;
const CONTROL_H: Header = 1;
const UPDATE_H: Header = 2;
const PARAMS_H: Header = 3;

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Sent by the coordinator right after a connection is attached.
    Welcome { participant: u64, round: u64 },
    Disconnect,
}

/// The application layer message for the entire system.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg<'a> {
    Err(Cow<'a, str>),
    Control(Command),
    /// A locally trained parameter set, from a participant to the coordinator.
    Update {
        samples: u64,
        params: Cow<'a, ParameterSet>,
    },
    /// The new global parameters, from the coordinator to a participant.
    Params(Cow<'a, ParameterSet>),
}

impl Msg<'_> {
    /// A short name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Err(_) => "err",
            Msg::Control(_) => "control",
            Msg::Update { .. } => "update",
            Msg::Params(_) => "params",
        }
    }

    fn buf_is_too_small<T>(size: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {HEADER_SIZE} bytes"),
        ))
    }

    fn invalid_kind<T>(kind: Header) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid message kind {kind}"),
        ))
    }
}

impl Serialize for Msg<'_> {
    fn serialize(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        match self {
            Msg::Err(e) => {
                buf.extend_from_slice(&ERR_H.to_be_bytes());
                buf.extend_from_slice(e.as_bytes());
            }
            Msg::Control(cmd) => {
                buf.extend_from_slice(&CONTROL_H.to_be_bytes());
                serde_json::to_writer(buf, cmd)?;
            }
            Msg::Update { samples, params } => {
                buf.extend_from_slice(&UPDATE_H.to_be_bytes());
                buf.extend_from_slice(&samples.to_be_bytes());
                params.serialize(buf)?;
            }
            Msg::Params(params) => {
                buf.extend_from_slice(&PARAMS_H.to_be_bytes());
                params.serialize(buf)?;
            }
        }

        Ok(())
    }
}

impl Deserialize for Msg<'static> {
    fn deserialize(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len());
        }

        let (kind_buf, rest) = buf.split_at(HEADER_SIZE);
        let kind = Header::from_be_bytes([kind_buf[0], kind_buf[1], kind_buf[2], kind_buf[3]]);

        match kind {
            ERR_H => {
                let string = std::str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Owned(string.to_string())))
            }
            CONTROL_H => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            UPDATE_H => {
                if rest.len() < size_of::<u64>() {
                    return Self::buf_is_too_small(buf.len());
                }

                let (samples_buf, blob) = rest.split_at(size_of::<u64>());
                let mut samples = [0; 8];
                samples.copy_from_slice(samples_buf);

                Ok(Self::Update {
                    samples: u64::from_be_bytes(samples),
                    params: Cow::Owned(ParameterSet::deserialize(blob)?),
                })
            }
            PARAMS_H => Ok(Self::Params(Cow::Owned(ParameterSet::deserialize(rest)?))),
            kind => Self::invalid_kind(kind),
        }
    }
}
