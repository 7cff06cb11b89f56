//! The shard index: a layout document mapping a root content digest to
//! per-shard slice positions, with a deterministic binary container form.

use models::codec;
use models::Digest;
use std::collections::BTreeMap;

/// Archive format version, the container's leading varint.
const VERSION: u64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to decode shard index")]
    Decode(#[from] models::Error),
    #[error("unsupported shard index version {0}")]
    UnsupportedVersion(u64),
    #[error("shard block digest mismatch: header names {expected:?}, block is {actual:?}")]
    ShardMismatch { expected: Digest, actual: Digest },
    #[error("shard index has {blocks} shard blocks but header names {named}")]
    BlockCount { blocks: usize, named: usize },
}

/// Position is a slice's byte span within its shard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position {
    pub offset: u64,
    pub length: u64,
}

/// ShardIndex describes how a content DAG is laid out across storage
/// shards: for each shard digest, the byte position of every slice
/// within it. Shards partition the block set, and the union of slice
/// digests covers every block of the content.
///
/// Shard indexes are immutable once serialized: the archive form is
/// deterministic, ordered by shard digest and then by slice digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardIndex {
    content: Digest,
    shards: BTreeMap<Digest, BTreeMap<Digest, Position>>,
}

impl ShardIndex {
    pub fn new(content: Digest) -> Self {
        Self {
            content,
            shards: BTreeMap::new(),
        }
    }

    /// The root content digest this index describes.
    pub fn content(&self) -> &Digest {
        &self.content
    }

    pub fn insert(&mut self, shard: Digest, slice: Digest, position: Position) {
        self.shards.entry(shard).or_default().insert(slice, position);
    }

    pub fn shards(&self) -> impl Iterator<Item = (&Digest, &BTreeMap<Digest, Position>)> {
        self.shards.iter()
    }

    pub fn shard_digests(&self) -> impl Iterator<Item = &Digest> {
        self.shards.keys()
    }

    /// Every distinct slice digest across all shards.
    pub fn slice_digests(&self) -> impl Iterator<Item = &Digest> {
        self.shards.values().flat_map(|slices| slices.keys())
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Serialize as a container: a version varint, a header block naming
    /// the content and every shard, then one block per shard.
    pub fn to_archive(&self) -> Vec<u8> {
        let mut header = Vec::new();
        self.content.write(&mut header);
        codec::write_uvarint(&mut header, self.shards.len() as u64);
        for shard in self.shards.keys() {
            shard.write(&mut header);
        }

        let mut archive = Vec::new();
        codec::write_uvarint(&mut archive, VERSION);
        codec::write_bytes(&mut archive, &header);

        for (shard, slices) in &self.shards {
            let mut block = Vec::new();
            shard.write(&mut block);
            codec::write_uvarint(&mut block, slices.len() as u64);
            for (slice, position) in slices {
                slice.write(&mut block);
                codec::write_uvarint(&mut block, position.offset);
                codec::write_uvarint(&mut block, position.length);
            }
            codec::write_bytes(&mut archive, &block);
        }
        archive
    }

    pub fn from_archive(archive: &[u8]) -> Result<Self, Error> {
        let mut input = archive;

        let version = codec::read_uvarint(&mut input)?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let mut header = codec::read_bytes(&mut input)?;
        let content = Digest::read(&mut header)?;
        let shard_count = codec::read_uvarint(&mut header)? as usize;
        let mut named = Vec::with_capacity(shard_count.min(1024));
        for _ in 0..shard_count {
            named.push(Digest::read(&mut header)?);
        }
        codec::expect_eof(header)?;

        let mut shards = BTreeMap::new();
        for expected in &named {
            let Ok(mut block) = codec::read_bytes(&mut input) else {
                return Err(Error::BlockCount {
                    blocks: shards.len(),
                    named: named.len(),
                });
            };

            let shard = Digest::read(&mut block)?;
            if &shard != expected {
                return Err(Error::ShardMismatch {
                    expected: expected.clone(),
                    actual: shard,
                });
            }

            let slice_count = codec::read_uvarint(&mut block)? as usize;
            let mut slices = BTreeMap::new();
            for _ in 0..slice_count {
                let slice = Digest::read(&mut block)?;
                let offset = codec::read_uvarint(&mut block)?;
                let length = codec::read_uvarint(&mut block)?;
                slices.insert(slice, Position { offset, length });
            }
            codec::expect_eof(block)?;
            shards.insert(shard, slices);
        }
        codec::expect_eof(input)?;

        Ok(Self { content, shards })
    }
}
