//! Record Codec Module
//!
//! Binary formats for everything written into a mapped file.
//!
//! ## Event Record Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header (128 bytes, little-endian)                           │
//! │   event_id (16) | sequence (8) | data_length (4)            │
//! │   event_type_len (4) + event_type                           │
//! │   timestamp (8)                                             │
//! │   aggregate_type_len (4) + aggregate_type                   │
//! │   aggregate_id (16) | version (8)                           │
//! │   metadata_count (4) + [key_len (4) key val_len (4) val]*   │
//! │   ... zero padding ...                                      │
//! │   payload_crc32 (4)                          (bytes 124-127)│
//! ├─────────────────────────────────────────────────────────────┤
//! │ Payload (data_length bytes)                                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cache Payloads
//! Cache entries carry no inline header. The file holds only the encoded
//! (optionally LZ4-compressed) value bytes; length and compression flag live
//! in the in-memory index.

mod compression;
mod event;
mod reader;
mod value;

pub use compression::{compress, decompress};
pub use event::{
    decode_event, decode_header, encode_event, encoded_header_len, peek_data_length, EventHeader,
    EVENT_HEADER_SIZE, HEADER_FIELD_BUDGET,
};
pub use value::{BincodeCodec, BytesCodec, Codec};

pub(crate) use reader::ByteReader;
