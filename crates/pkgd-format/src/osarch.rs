//! Operating-system and CPU-architecture enums used by package metadata and
//! the catalog database header.

/// Target operating system. Numeric values are the on-wire `u32` encoding
/// used by the database header's `os` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Os {
    Linux = 0,
    Darwin = 1,
    Windows = 2,
}

impl TryFrom<u32> for Os {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Linux),
            1 => Ok(Self::Darwin),
            2 => Ok(Self::Windows),
            _ => Err(value),
        }
    }
}

impl Os {
    /// Parses the lowercase string form used in package metadata
    /// (`"linux"`, `"darwin"`, `"windows"`). Unrecognized input has no
    /// valid `Os`, matching the wire format's `0xffff_ffff` sentinel.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "linux" => Some(Self::Linux),
            "darwin" => Some(Self::Darwin),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
        }
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target CPU architecture. Numeric values are the on-wire `u32` encoding
/// used by the database header's `arch` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Arch {
    X86 = 0,
    Amd64 = 1,
    Arm = 2,
    Arm64 = 3,
}

impl TryFrom<u32> for Arch {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::X86),
            1 => Ok(Self::Amd64),
            2 => Ok(Self::Arm),
            3 => Ok(Self::Arm64),
            _ => Err(value),
        }
    }
}

impl Arch {
    /// Parses the Go-style arch string used in package metadata (`"386"`,
    /// `"amd64"`, `"arm"`, `"arm64"`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "386" => Some(Self::X86),
            "amd64" => Some(Self::Amd64),
            "arm" => Some(Self::Arm),
            "arm64" => Some(Self::Arm64),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86 => "386",
            Self::Amd64 => "amd64",
            Self::Arm => "arm",
            Self::Arm64 => "arm64",
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_round_trips_through_its_string_form() {
        for os in [Os::Linux, Os::Darwin, Os::Windows] {
            assert_eq!(Os::parse(os.as_str()), Some(os));
        }
        assert_eq!(Os::parse("plan9"), None);
    }

    #[test]
    fn arch_round_trips_through_its_string_form() {
        for arch in [Arch::X86, Arch::Amd64, Arch::Arm, Arch::Arm64] {
            assert_eq!(Arch::parse(arch.as_str()), Some(arch));
        }
        assert_eq!(Arch::parse("riscv64"), None);
    }

    #[test]
    fn os_round_trips_through_its_wire_value() {
        for raw in 0u32..3 {
            assert_eq!(Os::try_from(raw).unwrap() as u32, raw);
        }
        assert_eq!(Os::try_from(99), Err(99));
    }
}
