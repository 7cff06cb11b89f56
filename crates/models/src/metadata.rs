use crate::codec::{self, Error};
use crate::{ByteRange, Cid, Digest};

/// Metadata tag for index claims.
pub const INDEX_TAG: u64 = 0x3E0000;
/// Metadata tag for equals claims.
pub const EQUALS_TAG: u64 = 0x3E0001;
/// Metadata tag for location commitments.
pub const LOCATION_TAG: u64 = 0x3E0002;

/// Metadata is the tagged union carried by provider records. The tag
/// identifies the claim kind, and every payload carries the content
/// identifier of the full signed claim so it can be fetched from the
/// provider's claim endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Metadata {
    Index {
        claim: Cid,
        index: Cid,
        expiration: Option<u64>,
    },
    Equals {
        claim: Cid,
        equals: Digest,
        expiration: Option<u64>,
    },
    Location {
        claim: Cid,
        range: Option<ByteRange>,
        shard: Option<Digest>,
        expiration: Option<u64>,
    },
}

impl Metadata {
    pub fn tag(&self) -> u64 {
        match self {
            Self::Index { .. } => INDEX_TAG,
            Self::Equals { .. } => EQUALS_TAG,
            Self::Location { .. } => LOCATION_TAG,
        }
    }

    /// The content identifier of the corresponding signed claim.
    pub fn claim(&self) -> &Cid {
        match self {
            Self::Index { claim, .. } => claim,
            Self::Equals { claim, .. } => claim,
            Self::Location { claim, .. } => claim,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        codec::write_uvarint(&mut buf, self.tag());

        match self {
            Self::Index {
                claim,
                index,
                expiration,
            } => {
                claim.write(&mut buf);
                index.write(&mut buf);
                codec::write_option(&mut buf, expiration.as_ref(), |b, v| {
                    codec::write_uvarint(b, *v)
                });
            }
            Self::Equals {
                claim,
                equals,
                expiration,
            } => {
                claim.write(&mut buf);
                equals.write(&mut buf);
                codec::write_option(&mut buf, expiration.as_ref(), |b, v| {
                    codec::write_uvarint(b, *v)
                });
            }
            Self::Location {
                claim,
                range,
                shard,
                expiration,
            } => {
                claim.write(&mut buf);
                codec::write_option(&mut buf, range.as_ref(), |b, r| r.write(b));
                codec::write_option(&mut buf, shard.as_ref(), |b, d| d.write(b));
                codec::write_option(&mut buf, expiration.as_ref(), |b, v| {
                    codec::write_uvarint(b, *v)
                });
            }
        }
        buf
    }

    /// Decode metadata bytes. Unknown tags are an `UnknownTag` error,
    /// which the provider index uses to drop unrecognized records.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut input = bytes;
        let tag = codec::read_uvarint(&mut input)?;

        let decoded = match tag {
            INDEX_TAG => Self::Index {
                claim: Cid::read(&mut input)?,
                index: Cid::read(&mut input)?,
                expiration: codec::read_option(&mut input, codec::read_uvarint)?,
            },
            EQUALS_TAG => Self::Equals {
                claim: Cid::read(&mut input)?,
                equals: Digest::read(&mut input)?,
                expiration: codec::read_option(&mut input, codec::read_uvarint)?,
            },
            LOCATION_TAG => Self::Location {
                claim: Cid::read(&mut input)?,
                range: codec::read_option(&mut input, ByteRange::read)?,
                shard: codec::read_option(&mut input, Digest::read)?,
                expiration: codec::read_option(&mut input, codec::read_uvarint)?,
            },
            other => return Err(Error::UnknownTag(other)),
        };

        codec::expect_eof(input)?;
        Ok(decoded)
    }
}
