use crate::error::MirrorError;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Target platforms recognized by the extension catalog and the update
/// service. Extensions either publish one archive per platform or a single
/// platform-neutral archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Platform {
    AlpineArm64,
    AlpineX64,
    DarwinArm64,
    DarwinX64,
    LinuxArm64,
    LinuxArmhf,
    LinuxX64,
    Web,
    Win32Arm64,
    Win32Ia32,
    Win32X64,
}

impl Platform {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AlpineArm64 => "alpine-arm64",
            Self::AlpineX64 => "alpine-x64",
            Self::DarwinArm64 => "darwin-arm64",
            Self::DarwinX64 => "darwin-x64",
            Self::LinuxArm64 => "linux-arm64",
            Self::LinuxArmhf => "linux-armhf",
            Self::LinuxX64 => "linux-x64",
            Self::Web => "web",
            Self::Win32Arm64 => "win32-arm64",
            Self::Win32Ia32 => "win32-ia32",
            Self::Win32X64 => "win32-x64",
        }
    }

    pub const fn all() -> [Platform; 11] {
        [
            Self::AlpineArm64,
            Self::AlpineX64,
            Self::DarwinArm64,
            Self::DarwinX64,
            Self::LinuxArm64,
            Self::LinuxArmhf,
            Self::LinuxX64,
            Self::Web,
            Self::Win32Arm64,
            Self::Win32Ia32,
            Self::Win32X64,
        ]
    }

    /// Platforms mirrored when none are requested explicitly.
    pub fn default_wanted() -> BTreeSet<Platform> {
        BTreeSet::from([Self::DarwinArm64, Self::LinuxX64, Self::Win32X64])
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::all()
            .into_iter()
            .find(|platform| platform.as_str() == s)
            .ok_or_else(|| MirrorError::UnknownPlatform(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_all() {
        for platform in Platform::all() {
            assert_eq!(platform.as_str().parse::<Platform>().unwrap(), platform);
        }
    }

    #[test]
    fn test_unknown_rejected() {
        assert!("linux-mips".parse::<Platform>().is_err());
        assert!("".parse::<Platform>().is_err());
        assert!("Linux-X64".parse::<Platform>().is_err());
    }

    #[test]
    fn test_default_wanted() {
        let wanted = Platform::default_wanted();
        assert_eq!(wanted.len(), 3);
        assert!(wanted.contains(&Platform::DarwinArm64));
        assert!(wanted.contains(&Platform::LinuxX64));
        assert!(wanted.contains(&Platform::Win32X64));
    }

    #[test]
    fn test_display() {
        assert_eq!(Platform::Win32Ia32.to_string(), "win32-ia32");
        assert_eq!(Platform::Web.to_string(), "web");
    }
}
