use crate::Error;
use models::{Cid, ContextId};
use std::collections::HashMap;
use std::sync::Mutex;

/// AdvertStore persists the advertisement chain: content-addressed
/// blocks (advert blocks and entries chunks) plus the single mutable
/// `head` key. Block writes are idempotent because they are content
/// addressed; the head is the chain's one serialization point and is
/// only replaced by compare-and-set.
#[async_trait::async_trait]
pub trait AdvertStore: Send + Sync + 'static {
    async fn get_block(&self, cid: &Cid) -> Result<Option<Vec<u8>>, Error>;

    async fn put_block(&self, cid: &Cid, block: Vec<u8>) -> Result<(), Error>;

    /// The current signed head bytes, if any.
    async fn head(&self) -> Result<Option<Vec<u8>>, Error>;

    /// Replace the head iff the stored value still equals `expect`.
    /// A mismatch is `Error::PreconditionFailed`.
    async fn cas_head(&self, expect: Option<&[u8]>, next: Vec<u8>) -> Result<(), Error>;
}

/// ContextTable is a small keyed table scoped by `(provider peer,
/// context ID)`. The publisher keeps two: `chunk-links` mapping to the
/// entries-chain head link, and `metadata` mapping to the advertised
/// metadata bytes, which together detect re-publication of an identical
/// advert.
#[async_trait::async_trait]
pub trait ContextTable: Send + Sync + 'static {
    async fn get(&self, peer: &str, context: &ContextId) -> Result<Option<Vec<u8>>, Error>;

    async fn put(&self, peer: &str, context: &ContextId, value: Vec<u8>) -> Result<(), Error>;

    async fn delete(&self, peer: &str, context: &ContextId) -> Result<(), Error>;
}

#[derive(Default)]
pub struct MemoryAdvertStore {
    blocks: Mutex<HashMap<Cid, Vec<u8>>>,
    head: Mutex<Option<Vec<u8>>>,
}

#[async_trait::async_trait]
impl AdvertStore for MemoryAdvertStore {
    async fn get_block(&self, cid: &Cid) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.blocks.lock().unwrap().get(cid).cloned())
    }

    async fn put_block(&self, cid: &Cid, block: Vec<u8>) -> Result<(), Error> {
        self.blocks.lock().unwrap().insert(cid.clone(), block);
        Ok(())
    }

    async fn head(&self) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.head.lock().unwrap().clone())
    }

    async fn cas_head(&self, expect: Option<&[u8]>, next: Vec<u8>) -> Result<(), Error> {
        let mut head = self.head.lock().unwrap();
        if head.as_deref() != expect {
            return Err(Error::PreconditionFailed);
        }
        *head = Some(next);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryContextTable {
    entries: Mutex<HashMap<(String, Vec<u8>), Vec<u8>>>,
}

impl MemoryContextTable {
    fn key(peer: &str, context: &ContextId) -> (String, Vec<u8>) {
        (peer.to_string(), context.as_bytes().to_vec())
    }
}

#[async_trait::async_trait]
impl ContextTable for MemoryContextTable {
    async fn get(&self, peer: &str, context: &ContextId) -> Result<Option<Vec<u8>>, Error> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(&Self::key(peer, context))
            .cloned())
    }

    async fn put(&self, peer: &str, context: &ContextId, value: Vec<u8>) -> Result<(), Error> {
        self.entries
            .lock()
            .unwrap()
            .insert(Self::key(peer, context), value);
        Ok(())
    }

    async fn delete(&self, peer: &str, context: &ContextId) -> Result<(), Error> {
        self.entries.lock().unwrap().remove(&Self::key(peer, context));
        Ok(())
    }
}
