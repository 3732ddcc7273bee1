//! Immutable sorted tables: meta page and block index codecs, the writer that
//! seals memtable snapshots into blobs, and the block-at-a-time reader.

pub mod meta;
pub mod reader;
pub mod writer;

pub use meta::{
    BlockIndexEntry, Extent, TableMeta, decode_index, decode_meta, encode_index, encode_meta,
};
pub use reader::TableReader;
pub use writer::{TableHead, TableWriter};
