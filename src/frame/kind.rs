//! One-byte tag identifying how a frame's payload is laid out.

use std::fmt;

/// Kind tag stored in the first byte of every frame.
///
/// # Examples
///
/// ```
/// use relayframe::frame::FrameKind;
/// assert_eq!(FrameKind::from_tag(0x01), Some(FrameKind::Chunk));
/// assert_eq!(FrameKind::Single.tag(), 0x00);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// The frame carries a complete message.
    Single,
    /// The frame carries one slice of a chunked batch.
    Chunk,
}

impl FrameKind {
    /// Tag byte written for [`FrameKind::Single`].
    pub const SINGLE_TAG: u8 = 0x00;
    /// Tag byte written for [`FrameKind::Chunk`].
    pub const CHUNK_TAG: u8 = 0x01;

    /// Return the tag byte for this kind.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Single => Self::SINGLE_TAG,
            Self::Chunk => Self::CHUNK_TAG,
        }
    }

    /// Interpret a tag byte, returning `None` for unknown values.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            Self::SINGLE_TAG => Some(Self::Single),
            Self::CHUNK_TAG => Some(Self::Chunk),
            _ => None,
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => f.write_str("SINGLE"),
            Self::Chunk => f.write_str("CHUNK"),
        }
    }
}
