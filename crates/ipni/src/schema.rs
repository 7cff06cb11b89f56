use crate::{key, Error, Keypair};
use models::codec;
use models::{Cid, ContextId, Digest, ProviderInfo, DAG_CBOR};

/// Maximum digests per entries chunk. Longer digest lists become a
/// linked list of chunks.
pub const MAX_CHUNK_ENTRIES: usize = 16_384;

/// EntriesChunk is one immutable block in an advertisement's linked
/// list of digests. The oldest chunk's `next` is null.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntriesChunk {
    pub entries: Vec<Digest>,
    pub next: Option<Cid>,
}

impl EntriesChunk {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        codec::write_uvarint(&mut buf, self.entries.len() as u64);
        for digest in &self.entries {
            digest.write(&mut buf);
        }
        codec::write_option(&mut buf, self.next.as_ref(), |b, cid| cid.write(b));
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut input = bytes;
        let count = codec::read_uvarint(&mut input)?;
        let mut entries = Vec::with_capacity(count.min(MAX_CHUNK_ENTRIES as u64) as usize);
        for _ in 0..count {
            entries.push(Digest::read(&mut input)?);
        }
        let next = codec::read_option(&mut input, Cid::read)?;
        codec::expect_eof(input)?;
        Ok(Self { entries, next })
    }

    pub fn cid(&self) -> Cid {
        Cid::from_block(DAG_CBOR, &self.to_bytes())
    }
}

/// Advertisement is one signed link in the publication chain: a batch
/// of digests a provider offers under a context, with a link to the
/// previous advert. The sign-over bytes exclude the signature field;
/// verifiers check the signature against the advertised provider's key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Advertisement {
    pub previous: Option<Cid>,
    pub provider: ProviderInfo,
    pub context_id: ContextId,
    pub metadata: Vec<u8>,
    pub entries: Option<Cid>,
    pub is_rm: bool,
    pub extended_providers: Vec<ProviderInfo>,
    pub public_key: [u8; 32],
    pub signature: Vec<u8>,
}

fn write_provider(buf: &mut Vec<u8>, provider: &ProviderInfo) {
    codec::write_str(buf, &provider.peer);
    codec::write_uvarint(buf, provider.addresses.len() as u64);
    for addr in &provider.addresses {
        codec::write_str(buf, addr.as_str());
    }
}

fn read_provider(input: &mut &[u8]) -> Result<ProviderInfo, models::Error> {
    let peer = codec::read_str(input)?.to_string();
    let count = codec::read_uvarint(input)?;
    let mut addresses = Vec::with_capacity(count.min(16) as usize);
    for _ in 0..count {
        let addr = codec::read_str(input)?;
        addresses.push(addr.parse().map_err(|_| models::Error::InvalidField {
            field: "provider address",
            detail: format!("invalid url {addr:?}"),
        })?);
    }
    Ok(ProviderInfo { peer, addresses })
}

impl Advertisement {
    /// The bytes a publisher signs over: everything but the signature.
    pub fn sign_over_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        codec::write_option(&mut buf, self.previous.as_ref(), |b, cid| cid.write(b));
        write_provider(&mut buf, &self.provider);
        codec::write_bytes(&mut buf, self.context_id.as_bytes());
        codec::write_bytes(&mut buf, &self.metadata);
        codec::write_option(&mut buf, self.entries.as_ref(), |b, cid| cid.write(b));
        buf.push(self.is_rm as u8);
        codec::write_uvarint(&mut buf, self.extended_providers.len() as u64);
        for provider in &self.extended_providers {
            write_provider(&mut buf, provider);
        }
        buf.extend_from_slice(&self.public_key);
        buf
    }

    /// Sign with the service key, filling `public_key` and `signature`.
    pub fn sign(&mut self, keypair: &Keypair) {
        self.public_key = keypair.public_bytes();
        self.signature = keypair.sign(&self.sign_over_bytes()).to_vec();
    }

    /// Verify the signature and that the signer is the advertised
    /// provider.
    pub fn verify(&self) -> Result<(), Error> {
        key::verify(&self.public_key, &self.sign_over_bytes(), &self.signature)?;

        let signer = key::peer_id(&self.public_key);
        if signer != self.provider.peer {
            return Err(Error::SignerMismatch {
                signer,
                provider: self.provider.peer.clone(),
            });
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = self.sign_over_bytes();
        codec::write_bytes(&mut buf, &self.signature);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut input = bytes;

        let previous = codec::read_option(&mut input, Cid::read)?;
        let provider = read_provider(&mut input)?;
        let context_id = ContextId::from_bytes(codec::read_bytes(&mut input)?.to_vec());
        let metadata = codec::read_bytes(&mut input)?.to_vec();
        let entries = codec::read_option(&mut input, Cid::read)?;

        let Some((&is_rm, rest)) = input.split_first() else {
            return Err(models::Error::Truncated("is_rm").into());
        };
        input = rest;

        let count = codec::read_uvarint(&mut input)?;
        let mut extended_providers = Vec::with_capacity(count.min(16) as usize);
        for _ in 0..count {
            extended_providers.push(read_provider(&mut input)?);
        }

        if input.len() < 32 {
            return Err(models::Error::Truncated("public key").into());
        }
        let (public, rest) = input.split_at(32);
        input = rest;
        let signature = codec::read_bytes(&mut input)?.to_vec();
        codec::expect_eof(input)?;

        Ok(Self {
            previous,
            provider,
            context_id,
            metadata,
            entries,
            is_rm: is_rm != 0,
            extended_providers,
            public_key: public.try_into().expect("split_at(32) yields 32 bytes"),
            signature,
        })
    }

    pub fn cid(&self) -> Cid {
        Cid::from_block(DAG_CBOR, &self.to_bytes())
    }
}

/// SignedHead is the signed pointer to the most recent advertisement in
/// a chain, read by remote indexer nodes to discover the publication
/// chain for a topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedHead {
    pub head: Cid,
    pub topic: String,
    pub public_key: [u8; 32],
    pub signature: Vec<u8>,
}

impl SignedHead {
    pub fn new(head: Cid, topic: impl Into<String>, keypair: &Keypair) -> Self {
        let mut signed = Self {
            head,
            topic: topic.into(),
            public_key: keypair.public_bytes(),
            signature: Vec::new(),
        };
        signed.signature = keypair.sign(&signed.sign_over_bytes()).to_vec();
        signed
    }

    fn sign_over_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.head.write(&mut buf);
        codec::write_str(&mut buf, &self.topic);
        buf.extend_from_slice(&self.public_key);
        buf
    }

    pub fn verify(&self) -> Result<(), Error> {
        key::verify(&self.public_key, &self.sign_over_bytes(), &self.signature)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = self.sign_over_bytes();
        codec::write_bytes(&mut buf, &self.signature);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut input = bytes;
        let head = Cid::read(&mut input)?;
        let topic = codec::read_str(&mut input)?.to_string();

        if input.len() < 32 {
            return Err(models::Error::Truncated("public key").into());
        }
        let (public, rest) = input.split_at(32);
        input = rest;
        let signature = codec::read_bytes(&mut input)?.to_vec();
        codec::expect_eof(input)?;

        Ok(Self {
            head,
            topic,
            public_key: public.try_into().expect("split_at(32) yields 32 bytes"),
            signature,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn provider(keypair: &Keypair) -> ProviderInfo {
        ProviderInfo {
            peer: keypair.peer_id(),
            addresses: vec!["https://node.example/".parse().unwrap()],
        }
    }

    fn advert(keypair: &Keypair, previous: Option<Cid>) -> Advertisement {
        let digest = Digest::sha2_256(b"content");
        let chunk = EntriesChunk {
            entries: vec![digest.clone()],
            next: None,
        };
        let mut advert = Advertisement {
            previous,
            provider: provider(keypair),
            context_id: ContextId::from_digest(&digest),
            metadata: vec![0x01, 0x02],
            entries: Some(chunk.cid()),
            is_rm: false,
            extended_providers: Vec::new(),
            public_key: [0; 32],
            signature: Vec::new(),
        };
        advert.sign(keypair);
        advert
    }

    #[test]
    fn test_advert_round_trip_and_verify() {
        let keypair = Keypair::generate();
        let advert = advert(&keypair, None);

        advert.verify().unwrap();

        let parsed = Advertisement::from_bytes(&advert.to_bytes()).unwrap();
        assert_eq!(parsed, advert);
        parsed.verify().unwrap();
        assert_eq!(parsed.cid(), advert.cid());
    }

    #[test]
    fn test_tampered_advert_fails_verification() {
        let keypair = Keypair::generate();
        let mut advert = advert(&keypair, None);

        advert.metadata = vec![0xff];
        assert!(matches!(advert.verify(), Err(Error::BadSignature)));
    }

    #[test]
    fn test_signer_must_be_the_provider() {
        let keypair = Keypair::generate();
        let mut advert = advert(&keypair, None);
        advert.provider.peer = "zSomeoneElse".to_string();
        advert.sign(&keypair);

        assert!(matches!(advert.verify(), Err(Error::SignerMismatch { .. })));
    }

    #[test]
    fn test_chain_links_by_cid() {
        let keypair = Keypair::generate();
        let first = advert(&keypair, None);
        let second = advert(&keypair, Some(first.cid()));

        assert_eq!(second.previous.as_ref(), Some(&first.cid()));
        assert_ne!(first.cid(), second.cid());
    }

    #[test]
    fn test_entries_chunk_round_trip() {
        let chunk = EntriesChunk {
            entries: (0..10)
                .map(|i: u32| Digest::sha2_256(&i.to_be_bytes()))
                .collect(),
            next: Some(Cid::from_block(DAG_CBOR, b"next chunk")),
        };
        let parsed = EntriesChunk::from_bytes(&chunk.to_bytes()).unwrap();
        assert_eq!(parsed, chunk);
    }

    #[test]
    fn test_signed_head_round_trip() {
        let keypair = Keypair::generate();
        let head = SignedHead::new(
            Cid::from_block(DAG_CBOR, b"an advert"),
            "/indexer/ingest/mainnet",
            &keypair,
        );

        head.verify().unwrap();
        let parsed = SignedHead::from_bytes(&head.to_bytes()).unwrap();
        assert_eq!(parsed, head);
        parsed.verify().unwrap();

        let mut tampered = parsed;
        tampered.head = Cid::from_block(DAG_CBOR, b"another advert");
        assert!(tampered.verify().is_err());
    }
}
