use crate::codec::Error;
use crate::{Did, Digest, Metadata};

/// ClaimKinds is a set of claim kinds, used to filter provider records
/// and to scope follow-up work during a query walk.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClaimKinds(u8);

impl ClaimKinds {
    pub const NONE: Self = Self(0);
    pub const LOCATION: Self = Self(1 << 0);
    pub const INDEX: Self = Self(1 << 1);
    pub const EQUALS: Self = Self(1 << 2);
    pub const ALL: Self = Self(0b111);

    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the record metadata's kind is within this set.
    pub fn matches(self, metadata: &Metadata) -> bool {
        let kind = match metadata {
            Metadata::Location { .. } => Self::LOCATION,
            Metadata::Index { .. } => Self::INDEX,
            Metadata::Equals { .. } => Self::EQUALS,
        };
        self.contains(kind)
    }
}

impl std::fmt::Debug for ClaimKinds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut set = f.debug_set();
        for (bit, name) in [
            (Self::LOCATION, "location"),
            (Self::INDEX, "index"),
            (Self::EQUALS, "equals"),
        ] {
            if self.contains(bit) {
                set.entry(&name);
            }
        }
        set.finish()
    }
}

/// QueryKind restricts which claim kinds seed jobs may chase.
/// The restriction applies to seeds only; follow-up jobs always carry
/// their own allowed-kinds set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    #[default]
    Standard,
    Location,
    IndexOrLocation,
}

impl QueryKind {
    pub fn seed_kinds(self) -> ClaimKinds {
        match self {
            Self::Standard => ClaimKinds::ALL,
            Self::Location => ClaimKinds::LOCATION,
            Self::IndexOrLocation => ClaimKinds::INDEX.with(ClaimKinds::LOCATION),
        }
    }
}

impl std::str::FromStr for QueryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "location" => Ok(Self::Location),
            "index_or_location" => Ok(Self::IndexOrLocation),
            other => Err(Error::InvalidField {
                field: "query type",
                detail: format!("{other:?}"),
            }),
        }
    }
}

/// Query is a request for the closure of claims and shard indexes
/// reachable from a set of seed digests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub hashes: Vec<Digest>,
    pub subjects: Vec<Did>,
    pub kind: QueryKind,
}

impl Query {
    pub fn standard(hashes: Vec<Digest>) -> Self {
        Self {
            hashes,
            subjects: Vec::new(),
            kind: QueryKind::Standard,
        }
    }
}
