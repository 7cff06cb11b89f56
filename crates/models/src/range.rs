use crate::codec::{self, Error};

/// ByteRange is a half-open byte span `[offset, offset+length)`.
/// A `None` length means open-ended: everything from `offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ByteRange {
    pub offset: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

impl ByteRange {
    pub fn new(offset: u64, length: Option<u64>) -> Self {
        Self { offset, length }
    }

    /// Render as an HTTP `Range` header value.
    pub fn to_header(&self) -> String {
        match self.length {
            Some(0) => format!("bytes={}-{}", self.offset, self.offset),
            Some(length) => format!("bytes={}-{}", self.offset, self.offset + length - 1),
            None => format!("bytes={}-", self.offset),
        }
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        codec::write_uvarint(buf, self.offset);
        codec::write_option(buf, self.length.as_ref(), |b, v| codec::write_uvarint(b, *v));
    }

    pub fn read(input: &mut &[u8]) -> Result<Self, Error> {
        Ok(Self {
            offset: codec::read_uvarint(input)?,
            length: codec::read_option(input, codec::read_uvarint)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::ByteRange;

    #[test]
    fn test_header_rendering() {
        assert_eq!(ByteRange::new(0, Some(500)).to_header(), "bytes=0-499");
        assert_eq!(ByteRange::new(100, Some(1)).to_header(), "bytes=100-100");
        assert_eq!(ByteRange::new(7, None).to_header(), "bytes=7-");
    }

    #[test]
    fn test_round_trip() {
        for range in [
            ByteRange::new(0, Some(500)),
            ByteRange::new(1 << 40, None),
        ] {
            let mut buf = Vec::new();
            range.write(&mut buf);
            let mut input = buf.as_slice();
            assert_eq!(ByteRange::read(&mut input).unwrap(), range);
            assert!(input.is_empty());
        }
    }
}
