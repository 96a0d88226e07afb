//! # Buffers
//!
//! Byte storage used by sessions for outbound and inbound traffic.

mod ring;

pub use ring::RingBuffer;
