pub mod codec;

mod digest;
pub use digest::{Digest, SHA2_256};

mod cid;
pub use cid::{Cid, DAG_CBOR, RAW};

mod did;
pub use did::Did;

mod context;
pub use context::ContextId;

mod range;
pub use range::ByteRange;

mod claim;
pub use claim::{
    Capability, Caveats, Claim, EqualsCaveats, IndexCaveats, LocationCaveats, RelationCaveats,
};

mod metadata;
pub use metadata::{Metadata, EQUALS_TAG, INDEX_TAG, LOCATION_TAG};

mod provider;
pub use provider::{ProviderInfo, ProviderRecord};

mod query;
pub use query::{ClaimKinds, Query, QueryKind};

/// Error is the decode error surfaced by the wire formats of this crate.
pub use codec::Error;
