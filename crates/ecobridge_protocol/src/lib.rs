//! ECO16BT thermostat protocol
//!
//! Pure, I/O-free pieces of the bridge:
//! - [`Characteristic`] identifiers and their GATT UUIDs
//! - [`checksum14`] used to spot repeated final chunks
//! - [`ChunkAssembler`] for characteristics that span several reads
//! - the [`codec`] module mapping every characteristic to typed records

pub mod characteristic;
pub mod checksum;
pub mod chunked;
pub mod codec;
pub mod error;

pub use characteristic::Characteristic;
pub use checksum::checksum14;
pub use chunked::{ChunkAssembler, ChunkStatus, FINAL_FLAG, MAX_CHUNKS};
pub use error::{CodecError, CodecResult};
