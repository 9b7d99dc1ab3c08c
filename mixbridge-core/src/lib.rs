//! # mixbridge-core
//!
//! Foundational, I/O-free building blocks shared by the rest of the
//! MultiMix bridge workspace: a lock-free byte-addressed SPSC ring
//! buffer, 24-bit wire <-> `f32` sample conversion, denormal flushing,
//! and a stack-allocated scratch vector for realtime hot paths.

pub mod denormal;
pub mod ring;
pub mod sample;
pub mod stack_vec;

pub use denormal::flush_denormal_f32;
pub use ring::{ByteRing, RingConsumer, RingProducer};
pub use sample::{INT_MAX, decode_24bit, encode_24bit_le};
pub use stack_vec::StackVec;
