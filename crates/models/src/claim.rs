use crate::codec::{self, Error};
use crate::{ByteRange, Cid, Did, Digest, DAG_CBOR};

/// Capability is the kind of attestation a claim makes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Content is retrievable at one or more URLs.
    Location,
    /// A shard-index document describes the content's layout.
    Index,
    /// The content digest is equivalent to another digest.
    Equals,
    /// Any other claim kind, transported but not interpreted.
    Relation(String),
}

impl Capability {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Location => "assert/location",
            Self::Index => "assert/index",
            Self::Equals => "assert/equals",
            Self::Relation(ability) => ability,
        }
    }

    pub fn parse(ability: &str) -> Self {
        match ability {
            "assert/location" => Self::Location,
            "assert/index" => Self::Index,
            "assert/equals" => Self::Equals,
            other => Self::Relation(other.to_string()),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocationCaveats {
    pub content: Digest,
    pub location: Vec<url::Url>,
    pub range: Option<ByteRange>,
    /// The shard holding `content`, when the claim was issued for a slice
    /// of a sharded DAG.
    pub shard: Option<Digest>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexCaveats {
    pub content: Digest,
    pub index: Cid,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EqualsCaveats {
    pub content: Digest,
    pub equals: Digest,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationCaveats {
    pub ability: String,
    pub content: Digest,
    pub payload: Vec<u8>,
}

/// Caveats is the typed payload of a claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Caveats {
    Location(LocationCaveats),
    Index(IndexCaveats),
    Equals(EqualsCaveats),
    Relation(RelationCaveats),
}

impl Caveats {
    pub fn capability(&self) -> Capability {
        match self {
            Self::Location(_) => Capability::Location,
            Self::Index(_) => Capability::Index,
            Self::Equals(_) => Capability::Equals,
            Self::Relation(caveats) => Capability::Relation(caveats.ability.clone()),
        }
    }

    /// The digest this claim is about.
    pub fn content(&self) -> &Digest {
        match self {
            Self::Location(caveats) => &caveats.content,
            Self::Index(caveats) => &caveats.content,
            Self::Equals(caveats) => &caveats.content,
            Self::Relation(caveats) => &caveats.content,
        }
    }
}

/// Claim is a signed attestation issued by some principal about a digest.
/// Claims are immutable: their canonical bytes, and therefore their
/// content identifier, never change once signed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claim {
    pub issuer: Did,
    pub audience: Did,
    pub caveats: Caveats,
    /// Unix seconds after which the claim is no longer valid.
    pub expiration: Option<u64>,
    /// Issuer signature over the canonical bytes sans this field.
    /// Verification is performed by the authorization collaborator.
    pub signature: Vec<u8>,
}

impl Claim {
    pub fn capability(&self) -> Capability {
        self.caveats.capability()
    }

    pub fn content(&self) -> &Digest {
        self.caveats.content()
    }

    pub fn is_expired(&self, now_secs: u64) -> bool {
        matches!(self.expiration, Some(exp) if exp < now_secs)
    }

    /// The content identifier of this claim: the hash of its canonical
    /// serialized form.
    pub fn content_id(&self) -> Cid {
        Cid::from_block(DAG_CBOR, &self.to_bytes())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_unsigned(&mut buf);
        codec::write_bytes(&mut buf, &self.signature);
        buf
    }

    /// The bytes an issuer signs over: everything except the signature.
    pub fn sign_over_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_unsigned(&mut buf);
        buf
    }

    fn write_unsigned(&self, buf: &mut Vec<u8>) {
        codec::write_str(buf, self.issuer.as_str());
        codec::write_str(buf, self.audience.as_str());
        codec::write_str(buf, self.capability().as_str());

        match &self.caveats {
            Caveats::Location(caveats) => {
                caveats.content.write(buf);
                codec::write_uvarint(buf, caveats.location.len() as u64);
                for url in &caveats.location {
                    codec::write_str(buf, url.as_str());
                }
                codec::write_option(buf, caveats.range.as_ref(), |b, r| r.write(b));
                codec::write_option(buf, caveats.shard.as_ref(), |b, d| d.write(b));
            }
            Caveats::Index(caveats) => {
                caveats.content.write(buf);
                caveats.index.write(buf);
            }
            Caveats::Equals(caveats) => {
                caveats.content.write(buf);
                caveats.equals.write(buf);
            }
            Caveats::Relation(caveats) => {
                caveats.content.write(buf);
                codec::write_bytes(buf, &caveats.payload);
            }
        }
        codec::write_option(buf, self.expiration.as_ref(), |b, v| {
            codec::write_uvarint(b, *v)
        });
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut input = bytes;

        let issuer = Did::new(codec::read_str(&mut input)?)?;
        let audience = Did::new(codec::read_str(&mut input)?)?;
        let ability = codec::read_str(&mut input)?.to_string();

        let caveats = match Capability::parse(&ability) {
            Capability::Location => {
                let content = Digest::read(&mut input)?;
                let count = codec::read_uvarint(&mut input)?;
                let mut location = Vec::with_capacity(count.min(16) as usize);
                for _ in 0..count {
                    let url = codec::read_str(&mut input)?;
                    location.push(url.parse().map_err(|_| Error::InvalidField {
                        field: "location",
                        detail: format!("invalid url {url:?}"),
                    })?);
                }
                Caveats::Location(LocationCaveats {
                    content,
                    location,
                    range: codec::read_option(&mut input, ByteRange::read)?,
                    shard: codec::read_option(&mut input, Digest::read)?,
                })
            }
            Capability::Index => Caveats::Index(IndexCaveats {
                content: Digest::read(&mut input)?,
                index: Cid::read(&mut input)?,
            }),
            Capability::Equals => Caveats::Equals(EqualsCaveats {
                content: Digest::read(&mut input)?,
                equals: Digest::read(&mut input)?,
            }),
            Capability::Relation(ability) => Caveats::Relation(RelationCaveats {
                ability,
                content: Digest::read(&mut input)?,
                payload: codec::read_bytes(&mut input)?.to_vec(),
            }),
        };

        let expiration = codec::read_option(&mut input, codec::read_uvarint)?;
        let signature = codec::read_bytes(&mut input)?.to_vec();
        codec::expect_eof(input)?;

        Ok(Self {
            issuer,
            audience,
            caveats,
            expiration,
            signature,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn did(s: &str) -> Did {
        Did::new(s).unwrap()
    }

    fn location_claim() -> Claim {
        Claim {
            issuer: did("did:key:zIssuer"),
            audience: did("did:web:cairn.network"),
            caveats: Caveats::Location(LocationCaveats {
                content: Digest::sha2_256(b"the content"),
                location: vec!["https://u.example/blob".parse().unwrap()],
                range: Some(ByteRange::new(0, Some(500))),
                shard: None,
            }),
            expiration: Some(1_900_000_000),
            signature: vec![0xab; 64],
        }
    }

    #[test]
    fn test_round_trips_every_kind() {
        let content = Digest::sha2_256(b"the content");
        let cases = vec![
            location_claim(),
            Claim {
                issuer: did("did:key:zIssuer"),
                audience: did("did:web:cairn.network"),
                caveats: Caveats::Index(IndexCaveats {
                    content: content.clone(),
                    index: Cid::from_block(DAG_CBOR, b"an index"),
                }),
                expiration: None,
                signature: vec![1; 64],
            },
            Claim {
                issuer: did("did:key:zIssuer"),
                audience: did("did:web:cairn.network"),
                caveats: Caveats::Equals(EqualsCaveats {
                    content: content.clone(),
                    equals: Digest::sha2_256(b"equivalent"),
                }),
                expiration: None,
                signature: vec![2; 64],
            },
            Claim {
                issuer: did("did:key:zIssuer"),
                audience: did("did:web:cairn.network"),
                caveats: Caveats::Relation(RelationCaveats {
                    ability: "assert/partition".to_string(),
                    content,
                    payload: b"opaque".to_vec(),
                }),
                expiration: None,
                signature: vec![3; 64],
            },
        ];

        for claim in cases {
            let parsed = Claim::from_bytes(&claim.to_bytes()).unwrap();
            assert_eq!(parsed, claim);
            assert_eq!(parsed.content_id(), claim.content_id());
        }
    }

    #[test]
    fn test_content_id_is_stable_and_signature_sensitive() {
        let claim = location_claim();
        assert_eq!(claim.content_id(), claim.content_id());

        let mut altered = claim.clone();
        altered.signature = vec![0xcd; 64];
        assert_ne!(claim.content_id(), altered.content_id());
        assert_eq!(claim.sign_over_bytes(), altered.sign_over_bytes());
    }

    #[test]
    fn test_expiration() {
        let claim = location_claim();
        assert!(!claim.is_expired(1_899_999_999));
        assert!(claim.is_expired(1_900_000_001));

        let mut eternal = claim;
        eternal.expiration = None;
        assert!(!eternal.is_expired(u64::MAX));
    }
}
