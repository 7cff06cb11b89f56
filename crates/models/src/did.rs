use crate::codec::Error;

/// Did is a validated decentralized identifier, such as
/// `did:key:z6Mk...` or `did:web:example.org`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct Did(String);

impl Did {
    pub fn new(s: impl Into<String>) -> Result<Self, Error> {
        let s = s.into();

        let mut parts = s.splitn(3, ':');
        let (scheme, method, suffix) = (parts.next(), parts.next(), parts.next());

        match (scheme, method, suffix) {
            (Some("did"), Some(method), Some(suffix))
                if !method.is_empty()
                    && !suffix.is_empty()
                    && method.bytes().all(|b| b.is_ascii_lowercase()) =>
            {
                Ok(Self(s))
            }
            _ => Err(Error::InvalidField {
                field: "did",
                detail: format!("{s:?} is not a did"),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl std::str::FromStr for Did {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> serde::Deserialize<'de> for Did {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error as _;
        let s = String::deserialize(deserializer)?;
        Did::new(s).map_err(|err| D::Error::custom(err.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::Did;

    #[test]
    fn test_validation() {
        for (case, expect) in [
            ("did:key:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK", true),
            ("did:web:cairn.network", true),
            ("did:web:u:sub", true),
            ("did::missing-method", false),
            ("did:key:", false),
            ("key:z6Mk", false),
            ("did:KEY:z6Mk", false),
            ("", false),
        ] {
            assert_eq!(Did::new(case).is_ok(), expect, "case: {case}");
        }
    }
}
