//! Values passed to and returned from the licensing backend.
use std::{fmt, ops::BitOr};

use serde::{Deserialize, Serialize};

/// Size in bytes of the message accepted by [`crate::Feature::sign`].
pub const MESSAGE_SIZE: usize = 20;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ApiVersion {
    pub code: u32,
    pub major: u32,
    pub minor: u32,
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Where the backend should look for dongles.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RemoteMode {
    #[default]
    Local,
    Remote,
    Any,
}

impl From<RemoteMode> for u8 {
    fn from(value: RemoteMode) -> Self {
        match value {
            RemoteMode::Local => 3,
            RemoteMode::Remote => 4,
            RemoteMode::Any => 7,
        }
    }
}

impl TryFrom<u8> for RemoteMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(Self::Local),
            4 => Ok(Self::Remote),
            7 => Ok(Self::Any),
            v => Err(format!("Expected remote mode 3, 4 or 7 but got {v}")),
        }
    }
}

/// Restricts which dongles a query or login can see.
///
/// `dongle_model` is a bit mask of dongle models where `0` means any model.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Visibility {
    pub dongle_model: u32,
    pub remote_mode: RemoteMode,
}

impl Default for Visibility {
    fn default() -> Self {
        Self {
            dongle_model: 0x480,
            remote_mode: RemoteMode::Local,
        }
    }
}

impl Visibility {
    pub fn admits(&self, dongle_model: u32) -> bool {
        self.dongle_model == 0 || self.dongle_model & dongle_model != 0
    }
}

/// The pair of access codes a vendor uses to authenticate a feature login.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VendorCodes {
    pub access_code1: u32,
    pub access_code2: u32,
}

impl VendorCodes {
    pub const fn new(access_code1: u32, access_code2: u32) -> Self {
        Self {
            access_code1,
            access_code2,
        }
    }
}

/// Cipher mode and flags for [`crate::Feature::encrypt`] and [`crate::Feature::decrypt`].
///
/// The low byte selects the cipher mode, the remaining bits are flags.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct EncryptMode(u32);

impl EncryptMode {
    pub const ECB: Self = Self(0x0);
    pub const CBC: Self = Self(0x1);
    pub const CFB: Self = Self(0x2);
    pub const OFB: Self = Self(0x3);
    /// Do not decrement the run counter of the feature.
    pub const NO_COUNTER_DECREMENT: Self = Self(0x100);

    const CIPHER_MASK: u32 = 0xff;

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn cipher(self) -> Self {
        Self(self.0 & Self::CIPHER_MASK)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the cipher mode only accepts whole blocks.
    pub fn is_block_mode(self) -> bool {
        self.cipher() == Self::ECB || self.cipher() == Self::CBC
    }
}

impl BitOr for EncryptMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
