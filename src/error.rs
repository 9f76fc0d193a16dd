//! Error types for each phase of talking to the inverter and the Domoticz sink.
//!
//! None of these are fatal: transport and decode errors feed the poll state machine, sink errors are
//! logged and dropped (or retried during bootstrap).

use std::io;
use thiserror::Error;

/// Failure while exchanging frames with the inverter.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unable to connect to {endpoint}: {source}")]
    Connect { endpoint: String, source: io::Error },

    #[error("connecting to {endpoint} timed out")]
    ConnectTimeout { endpoint: String },

    #[error("unable to send identification to the inverter: {0}")]
    Send(io::Error),

    #[error("no data received from device: {0}")]
    Receive(io::Error),

    #[error("no data received from device within the read timeout")]
    ReceiveTimeout,
}

/// Failure while extracting a mapped field from a response frame.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("field {field} at offset {offset} (+{length}) exceeds frame of {frame_len} bytes")]
    OutOfBounds {
        field: &'static str,
        offset: usize,
        length: usize,
        frame_len: usize,
    },

    #[error("field {field} has a non-positive divisor")]
    InvalidDivisor { field: &'static str },
}

/// Why a single poll cycle did not produce readings.
#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("incorrect data length, expected more than 90 bytes but received {received} bytes")]
    ShortFrame { received: usize },

    #[error("error while parsing: {0}")]
    Decode(#[from] DecodeError),
}

/// Failure talking to the Domoticz sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("No Domoticz connection")]
    NoConnection,

    #[error("Domoticz request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Domoticz replied with status {status}")]
    Rejected { status: String },

    #[error("Domoticz reply has no result data")]
    MissingData,

    #[error("Domoticz value '{0}' is not numeric")]
    NotNumeric(String),
}
