//! Target description: the triple pieces and what they imply for layout
//! and the `@compile_var` surface.

use strum::{Display, EnumString, IntoStaticStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum TargetOs {
    Linux,
    Macos,
    Windows,
    Freestanding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum TargetArch {
    X86_64,
    Aarch64,
    I386,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum TargetEnviron {
    Gnu,
    Musl,
    Msvc,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetInfo {
    pub os: TargetOs,
    pub arch: TargetArch,
    pub environ: TargetEnviron,
}

impl TargetInfo {
    /// The host target, used when no override flags are given.
    pub fn native() -> Self {
        let os = if cfg!(target_os = "macos") {
            TargetOs::Macos
        } else if cfg!(target_os = "windows") {
            TargetOs::Windows
        } else {
            TargetOs::Linux
        };
        let arch = if cfg!(target_arch = "aarch64") {
            TargetArch::Aarch64
        } else if cfg!(target_arch = "x86") {
            TargetArch::I386
        } else {
            TargetArch::X86_64
        };
        let environ = match os {
            TargetOs::Windows => TargetEnviron::Msvc,
            TargetOs::Macos => TargetEnviron::None,
            _ => TargetEnviron::Gnu,
        };
        TargetInfo { os, arch, environ }
    }

    pub fn ptr_bits(self) -> u32 {
        match self.arch {
            TargetArch::I386 => 32,
            TargetArch::X86_64 | TargetArch::Aarch64 => 64,
        }
    }

    /// All supported targets are little-endian.
    pub fn is_big_endian(self) -> bool {
        false
    }

    /// The LLVM triple string for the module header.
    pub fn triple(self) -> String {
        let arch = match self.arch {
            TargetArch::X86_64 => "x86_64",
            TargetArch::Aarch64 => "aarch64",
            TargetArch::I386 => "i386",
        };
        let os = match self.os {
            TargetOs::Linux => "unknown-linux",
            TargetOs::Macos => "apple-macosx",
            TargetOs::Windows => "pc-windows",
            TargetOs::Freestanding => "unknown-none",
        };
        let environ = match self.environ {
            TargetEnviron::Gnu => "-gnu",
            TargetEnviron::Musl => "-musl",
            TargetEnviron::Msvc => "-msvc",
            TargetEnviron::None => "",
        };
        format!("{arch}-{os}{environ}")
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn triple_rendering() {
        let target = TargetInfo {
            os: TargetOs::Linux,
            arch: TargetArch::X86_64,
            environ: TargetEnviron::Gnu,
        };
        assert_eq!(target.triple(), "x86_64-unknown-linux-gnu");
        assert_eq!(target.ptr_bits(), 64);
    }

    #[test]
    fn parse_overrides() {
        assert_eq!(TargetOs::from_str("macos").unwrap(), TargetOs::Macos);
        assert_eq!(TargetArch::from_str("aarch64").unwrap(), TargetArch::Aarch64);
        assert!(TargetOs::from_str("plan9").is_err());
    }
}
