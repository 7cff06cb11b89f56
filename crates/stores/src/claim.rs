use crate::Error;
use models::{Cid, Claim};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// ClaimStore is the content-addressed store of signed claims. Claims
/// are write-once: a put of a content ID the store already holds is a
/// no-op, which makes concurrent identical writes safe.
#[async_trait::async_trait]
pub trait ClaimStore: Send + Sync + 'static {
    async fn get(&self, cid: &Cid) -> Result<Option<Arc<Claim>>, Error>;

    async fn put(&self, cid: Cid, claim: Arc<Claim>) -> Result<(), Error>;
}

#[derive(Default)]
pub struct MemoryClaimStore {
    claims: Mutex<HashMap<Cid, Arc<Claim>>>,
}

#[async_trait::async_trait]
impl ClaimStore for MemoryClaimStore {
    async fn get(&self, cid: &Cid) -> Result<Option<Arc<Claim>>, Error> {
        Ok(self.claims.lock().unwrap().get(cid).cloned())
    }

    async fn put(&self, cid: Cid, claim: Arc<Claim>) -> Result<(), Error> {
        self.claims.lock().unwrap().entry(cid).or_insert(claim);
        Ok(())
    }
}
