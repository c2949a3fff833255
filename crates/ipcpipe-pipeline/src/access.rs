use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

/// Read/write capability of a pipeline, fixed at construction.
///
/// Flags combine like bits: `READ | WRITE == READ_WRITE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipeAccess(u8);

impl PipeAccess {
    pub const READ: Self = Self(1);
    pub const WRITE: Self = Self(2);
    pub const READ_WRITE: Self = Self(3);

    /// Capability from its flag bits. `None` for 0 or unknown bits.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            1..=3 => Some(Self(bits)),
            _ => None,
        }
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn can_read(self) -> bool {
        self.0 & Self::READ.0 != 0
    }

    pub const fn can_write(self) -> bool {
        self.0 & Self::WRITE.0 != 0
    }
}

impl BitOr for PipeAccess {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for PipeAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match *self {
            Self::READ => "read",
            Self::WRITE => "write",
            _ => "read-write",
        };
        f.write_str(label)
    }
}

impl FromStr for PipeAccess {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read" | "r" => Ok(Self::READ),
            "write" | "w" => Ok(Self::WRITE),
            "read-write" | "readwrite" | "rw" => Ok(Self::READ_WRITE),
            other => Err(format!(
                "unknown access '{other}' (expected read, write or read-write)"
            )),
        }
    }
}
