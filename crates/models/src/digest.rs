use crate::codec::{self, Error};
use sha2::Digest as _;

/// Multihash code for sha2-256.
pub const SHA2_256: u64 = 0x12;

/// Digest is a self-describing hash: a hash-function code plus the raw
/// hash bytes. Its canonical text form is base-58 of the binary form with
/// a leading `z`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest {
    code: u64,
    bytes: Vec<u8>,
}

impl Digest {
    pub fn new(code: u64, bytes: Vec<u8>) -> Self {
        Self { code, bytes }
    }

    /// Hash `data` with sha2-256.
    pub fn sha2_256(data: &[u8]) -> Self {
        Self {
            code: SHA2_256,
            bytes: sha2::Sha256::digest(data).to_vec(),
        }
    }

    pub fn code(&self) -> u64 {
        self.code
    }

    /// The raw hash bytes, without the self-describing prefix.
    pub fn hash_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The self-describing binary form: varint code, varint length, bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.bytes.len() + 4);
        codec::write_uvarint(&mut buf, self.code);
        codec::write_bytes(&mut buf, &self.bytes);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut input = bytes;
        let digest = Self::read(&mut input)?;
        codec::expect_eof(input)?;
        Ok(digest)
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        codec::write_uvarint(buf, self.code);
        codec::write_bytes(buf, &self.bytes);
    }

    pub fn read(input: &mut &[u8]) -> Result<Self, Error> {
        let code = codec::read_uvarint(input)?;
        let bytes = codec::read_bytes(input)?.to_vec();

        if bytes.is_empty() {
            return Err(Error::InvalidField {
                field: "digest",
                detail: "empty hash".to_string(),
            });
        }
        Ok(Self { code, bytes })
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "z{}", bs58::encode(self.to_bytes()).into_string())
    }
}

impl std::fmt::Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl std::str::FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let encoded = s.strip_prefix('z').unwrap_or(s);
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|err| Error::InvalidField {
                field: "digest",
                detail: err.to_string(),
            })?;
        Self::from_bytes(&bytes)
    }
}

impl serde::Serialize for Digest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Digest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error as _;
        let s = std::borrow::Cow::<'de, str>::deserialize(deserializer)?;
        s.parse()
            .map_err(|err| D::Error::custom(format!("invalid digest: {err}")))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_text_round_trip() {
        let digest = Digest::sha2_256(b"hello world");
        let text = digest.to_string();
        assert!(text.starts_with('z'));

        let parsed: Digest = text.parse().unwrap();
        assert_eq!(parsed, digest);

        // The bare (un-prefixed) form also parses.
        let parsed: Digest = text[1..].parse().unwrap();
        assert_eq!(parsed, digest);
    }

    #[test]
    fn test_canonical_text_form() {
        let digest = Digest::sha2_256(b"hello world");
        insta::assert_snapshot!(digest, @"zQmaozNR7DZHQK1ZcU9p7QdrshMvXqWK6gpu5rmrkPdT3L4");
    }

    #[test]
    fn test_binary_round_trip() {
        let digest = Digest::sha2_256(b"some content");
        let parsed = Digest::from_bytes(&digest.to_bytes()).unwrap();
        assert_eq!(parsed, digest);
        assert_eq!(parsed.code(), SHA2_256);
        assert_eq!(parsed.hash_bytes().len(), 32);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("not base58 !!".parse::<Digest>().is_err());
        assert!(Digest::from_bytes(&[0x12, 0x00]).is_err()); // Empty hash.

        // Trailing bytes after a well-formed digest.
        let mut bytes = Digest::sha2_256(b"x").to_bytes();
        bytes.push(0xff);
        assert_eq!(
            Digest::from_bytes(&bytes).unwrap_err(),
            Error::TrailingBytes(1)
        );
    }
}
