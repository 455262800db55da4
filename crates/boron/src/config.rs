//! Build configuration assembled by the driver from CLI flags.

use std::path::PathBuf;

use strum::{Display, EnumString};

use crate::target::TargetInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum OutKind {
    Obj,
    Exe,
    Lib,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub out_kind: OutKind,
    pub out_path: Option<PathBuf>,
    /// Release builds skip runtime safety checks and stack poisoning.
    pub release: bool,
    pub is_test: bool,
    pub strip_debug: bool,
    pub verbose: bool,
    pub lib_dirs: Vec<PathBuf>,
    pub libs: Vec<String>,
    pub target: TargetInfo,
    pub libc_include_dir: Option<PathBuf>,
    pub libc_lib_dir: Option<PathBuf>,
    pub dynamic_linker: Option<PathBuf>,
    pub link_libc: bool,
    pub rdynamic: bool,
    pub mingw_version: Option<String>,
    pub macosx_version_min: Option<String>,
    pub ios_version_min: Option<String>,
    /// Emit a C header for exported functions next to the output.
    pub emit_header: Option<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            out_kind: OutKind::Exe,
            out_path: None,
            release: false,
            is_test: false,
            strip_debug: false,
            verbose: false,
            lib_dirs: Vec::new(),
            libs: Vec::new(),
            target: TargetInfo::native(),
            libc_include_dir: None,
            libc_lib_dir: None,
            dynamic_linker: None,
            link_libc: false,
            rdynamic: false,
            mingw_version: None,
            macosx_version_min: None,
            ios_version_min: None,
            emit_header: None,
        }
    }
}
