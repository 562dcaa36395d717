//! `donna-telephony` — everything that touches the Twilio boundary.
//!
//! The media-stream socket task lives in the gateway; this crate supplies
//! the wire types it parses, the μ-law codec, webhook signature validation,
//! the outbound-call REST client, and the two transport processors that
//! bridge the socket to the frame pipeline.

pub mod error;
pub mod events;
pub mod mulaw;
pub mod outbound;
pub mod signature;
pub mod transport;

pub use error::{Result, TransportError};
pub use events::{OutboundMessage, TwilioEvent};
pub use outbound::{normalize_phone, TwilioClient};
pub use transport::{paced_writer, InterruptEpoch, TransportIn, TransportOut};
