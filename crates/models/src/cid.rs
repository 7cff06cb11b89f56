use crate::codec::{self, Error};
use crate::Digest;

/// Multicodec for raw bytes.
pub const RAW: u64 = 0x55;
/// Multicodec for deterministically encoded structured blocks.
pub const DAG_CBOR: u64 = 0x71;

/// Cid is a content identifier: a digest wrapped with a codec tag,
/// used as a stable decentralized name for a block of bytes.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cid {
    codec: u64,
    digest: Digest,
}

impl Cid {
    pub fn new(codec: u64, digest: Digest) -> Self {
        Self { codec, digest }
    }

    /// Address a block of deterministically encoded bytes.
    pub fn from_block(codec: u64, block: &[u8]) -> Self {
        Self {
            codec,
            digest: Digest::sha2_256(block),
        }
    }

    pub fn codec(&self) -> u64 {
        self.codec
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write(&mut buf);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut input = bytes;
        let cid = Self::read(&mut input)?;
        codec::expect_eof(input)?;
        Ok(cid)
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        codec::write_uvarint(buf, self.codec);
        self.digest.write(buf);
    }

    pub fn read(input: &mut &[u8]) -> Result<Self, Error> {
        let codec = codec::read_uvarint(input)?;
        let digest = Digest::read(input)?;
        Ok(Self { codec, digest })
    }
}

impl std::fmt::Display for Cid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "z{}", bs58::encode(self.to_bytes()).into_string())
    }
}

impl std::fmt::Debug for Cid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl std::str::FromStr for Cid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let encoded = s.strip_prefix('z').unwrap_or(s);
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|err| Error::InvalidField {
                field: "cid",
                detail: err.to_string(),
            })?;
        Self::from_bytes(&bytes)
    }
}

impl serde::Serialize for Cid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Cid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error as _;
        let s = std::borrow::Cow::<'de, str>::deserialize(deserializer)?;
        s.parse()
            .map_err(|err| D::Error::custom(format!("invalid cid: {err}")))
    }
}
