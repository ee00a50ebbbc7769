//! Key descriptor
//!
//! Access control, retention, security attributes and behaviour flags that
//! travel with a key. Each bit set is a newtype over `u8` with named
//! accessors; the raw bit values are the persisted encoding.

/// Owner/other × read/write/execute permission bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessControl(u8);

impl AccessControl {
    pub const OWNER_READ: u8 = 1 << 0;
    pub const OWNER_WRITE: u8 = 1 << 1;
    pub const OWNER_EXECUTE: u8 = 1 << 2;
    pub const OTHER_READ: u8 = 1 << 3;
    pub const OTHER_WRITE: u8 = 1 << 4;
    pub const OTHER_EXECUTE: u8 = 1 << 5;

    const ALL: u8 = 0x3f;

    /// No permissions at all
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Owner read + write, the default for newly created keys
    pub const fn owner_read_write() -> Self {
        Self(Self::OWNER_READ | Self::OWNER_WRITE)
    }

    /// Build from persisted bits; unknown high bits are dropped
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn owner_read(self) -> bool {
        self.0 & Self::OWNER_READ != 0
    }

    pub const fn owner_write(self) -> bool {
        self.0 & Self::OWNER_WRITE != 0
    }

    pub const fn owner_execute(self) -> bool {
        self.0 & Self::OWNER_EXECUTE != 0
    }

    pub const fn other_read(self) -> bool {
        self.0 & Self::OTHER_READ != 0
    }

    pub const fn other_write(self) -> bool {
        self.0 & Self::OTHER_WRITE != 0
    }

    pub const fn other_execute(self) -> bool {
        self.0 & Self::OTHER_EXECUTE != 0
    }

    /// Return a copy with `bit` set or cleared
    pub const fn with(self, bit: u8, on: bool) -> Self {
        if on {
            Self((self.0 | bit) & Self::ALL)
        } else {
            Self(self.0 & !bit)
        }
    }
}

impl Default for AccessControl {
    fn default() -> Self {
        Self::owner_read_write()
    }
}

/// How persistently a value must survive power/reset cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum RetentionLevel {
    /// Kept only while the device stays powered
    WhileDeviceActive = 0,
    /// Survives a warm reset but not a power cycle
    TillNextBoot = 1,
    /// Survives power loss
    #[default]
    NonVolatile = 2,
}

impl RetentionLevel {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(RetentionLevel::WhileDeviceActive),
            1 => Some(RetentionLevel::TillNextBoot),
            2 => Some(RetentionLevel::NonVolatile),
            _ => None,
        }
    }
}

/// Storage security properties a key requires from its backing media.
///
/// Informational: checked against the journal's advertised features at
/// Create time, never enforced cryptographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SecurityFeatures(u8);

impl SecurityFeatures {
    pub const ACLS: u8 = 1 << 0;
    pub const ROLLBACK_PROTECTION: u8 = 1 << 1;
    pub const TAMPER_PROOF: u8 = 1 << 2;
    pub const INTERNAL_FLASH: u8 = 1 << 3;
    pub const SRAM: u8 = 1 << 4;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x1f)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn with(self, bit: u8, on: bool) -> Self {
        if on {
            Self((self.0 | bit) & 0x1f)
        } else {
            Self(self.0 & !bit)
        }
    }

    pub const fn acls(self) -> bool {
        self.0 & Self::ACLS != 0
    }

    pub const fn rollback_protection(self) -> bool {
        self.0 & Self::ROLLBACK_PROTECTION != 0
    }

    pub const fn tamper_proof(self) -> bool {
        self.0 & Self::TAMPER_PROOF != 0
    }

    pub const fn internal_flash(self) -> bool {
        self.0 & Self::INTERNAL_FLASH != 0
    }

    pub const fn sram(self) -> bool {
        self.0 & Self::SRAM != 0
    }

    /// True when every feature requested in `other` is present in `self`
    pub const fn contains(self, other: SecurityFeatures) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Behaviour bits for Create/Open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeyFlags(u8);

impl KeyFlags {
    pub const LAZY_FLUSH: u8 = 1 << 0;
    pub const FLUSH_ON_CLOSE: u8 = 1 << 1;
    pub const STORAGE_DETECT: u8 = 1 << 2;
    pub const READ: u8 = 1 << 3;
    pub const WRITE: u8 = 1 << 4;
    pub const EXECUTE: u8 = 1 << 5;

    pub const fn empty() -> Self {
        Self(0)
    }

    /// Open mode: read only
    pub const fn read_only() -> Self {
        Self(Self::READ)
    }

    /// Open mode: read and write
    pub const fn read_write() -> Self {
        Self(Self::READ | Self::WRITE)
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x3f)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn with(self, bit: u8, on: bool) -> Self {
        if on {
            Self((self.0 | bit) & 0x3f)
        } else {
            Self(self.0 & !bit)
        }
    }

    pub const fn lazy_flush(self) -> bool {
        self.0 & Self::LAZY_FLUSH != 0
    }

    pub const fn flush_on_close(self) -> bool {
        self.0 & Self::FLUSH_ON_CLOSE != 0
    }

    pub const fn storage_detect(self) -> bool {
        self.0 & Self::STORAGE_DETECT != 0
    }

    pub const fn read(self) -> bool {
        self.0 & Self::READ != 0
    }

    pub const fn write(self) -> bool {
        self.0 & Self::WRITE != 0
    }

    pub const fn execute(self) -> bool {
        self.0 & Self::EXECUTE != 0
    }
}

/// Everything Create needs to know about a new key besides name and size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyDescriptor {
    pub acl: AccessControl,
    pub retention: RetentionLevel,
    pub security: SecurityFeatures,
    pub flags: KeyFlags,
}

impl KeyDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acl(mut self, acl: AccessControl) -> Self {
        self.acl = acl;
        self
    }

    pub fn retention(mut self, retention: RetentionLevel) -> Self {
        self.retention = retention;
        self
    }

    pub fn security(mut self, security: SecurityFeatures) -> Self {
        self.security = security;
        self
    }

    pub fn flags(mut self, flags: KeyFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Feasibility probe: Create validates and checks space, creates nothing
    pub fn storage_detect(mut self) -> Self {
        self.flags = self.flags.with(KeyFlags::STORAGE_DETECT, true);
        self
    }
}
