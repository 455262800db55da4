use std::{env, fs, path::PathBuf, process::ExitCode, str::FromStr, time::Instant};

use boron::{BuildConfig, Compilation, OutKind, TargetArch, TargetEnviron, TargetOs};

const USAGE: &str = "\
usage: boron [command] [options] <source>
commands:
  build                  compile a root source file (default)
  test                   compile in test mode
options:
  -o <path>              output path for the .ll module
  --out-kind <kind>      obj | exe | lib
  --release              release build (no safety checks)
  --strip                omit debug information
  --verbose              print per-phase progress
  --emit-h <path>        also write a C header for exported functions
  -L <dir>               add a library search directory
  -l <lib>               link against a library
  --target-os <os>       linux | macos | windows | freestanding
  --target-arch <arch>   x86_64 | aarch64 | i386
  --target-environ <e>   gnu | musl | msvc | none
  --libc-include-dir <d> libc include directory
  --libc-lib-dir <d>     libc library directory
  --dynamic-linker <p>   dynamic linker path
  --link-libc            link against libc
  --rdynamic             add rdynamic to the link line
  --mingw-version <v>    mingw version string
  --macosx-version-min <v>
  --ios-version-min <v>
";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut config = BuildConfig::default();
    let mut source_path: Option<PathBuf> = None;

    let mut iter = args.iter().peekable();
    // an optional leading command word
    if let Some(first) = iter.peek() {
        match first.as_str() {
            "build" => {
                iter.next();
            }
            "test" => {
                config.is_test = true;
                iter.next();
            }
            _ => {}
        }
    }

    macro_rules! next_value {
        ($flag:expr) => {
            match iter.next() {
                Some(value) => value,
                None => {
                    eprintln!("error: expected value after {}", $flag);
                    return ExitCode::FAILURE;
                }
            }
        };
    }

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                eprint!("{USAGE}");
                return ExitCode::SUCCESS;
            }
            "-o" => config.out_path = Some(PathBuf::from(next_value!("-o"))),
            "--out-kind" => {
                let value = next_value!("--out-kind");
                match OutKind::from_str(value) {
                    Ok(kind) => config.out_kind = kind,
                    Err(_) => {
                        eprintln!("error: invalid output kind '{value}'");
                        return ExitCode::FAILURE;
                    }
                }
            }
            "--release" => config.release = true,
            "--strip" => config.strip_debug = true,
            "--verbose" => config.verbose = true,
            "--emit-h" => config.emit_header = Some(PathBuf::from(next_value!("--emit-h"))),
            "-L" => config.lib_dirs.push(PathBuf::from(next_value!("-L"))),
            "-l" => config.libs.push(next_value!("-l").clone()),
            "--target-os" => {
                let value = next_value!("--target-os");
                match TargetOs::from_str(value) {
                    Ok(os) => config.target.os = os,
                    Err(_) => {
                        eprintln!("error: invalid target os '{value}'");
                        return ExitCode::FAILURE;
                    }
                }
            }
            "--target-arch" => {
                let value = next_value!("--target-arch");
                match TargetArch::from_str(value) {
                    Ok(arch) => config.target.arch = arch,
                    Err(_) => {
                        eprintln!("error: invalid target arch '{value}'");
                        return ExitCode::FAILURE;
                    }
                }
            }
            "--target-environ" => {
                let value = next_value!("--target-environ");
                match TargetEnviron::from_str(value) {
                    Ok(environ) => config.target.environ = environ,
                    Err(_) => {
                        eprintln!("error: invalid target environ '{value}'");
                        return ExitCode::FAILURE;
                    }
                }
            }
            "--libc-include-dir" => {
                config.libc_include_dir = Some(PathBuf::from(next_value!("--libc-include-dir")));
            }
            "--libc-lib-dir" => {
                config.libc_lib_dir = Some(PathBuf::from(next_value!("--libc-lib-dir")));
            }
            "--dynamic-linker" => {
                config.dynamic_linker = Some(PathBuf::from(next_value!("--dynamic-linker")));
            }
            "--link-libc" => config.link_libc = true,
            "--rdynamic" => config.rdynamic = true,
            "--mingw-version" => config.mingw_version = Some(next_value!("--mingw-version").clone()),
            "--macosx-version-min" => {
                config.macosx_version_min = Some(next_value!("--macosx-version-min").clone());
            }
            "--ios-version-min" => {
                config.ios_version_min = Some(next_value!("--ios-version-min").clone());
            }
            other if other.starts_with('-') => {
                eprintln!("error: unrecognized option '{other}'");
                return ExitCode::FAILURE;
            }
            other => {
                if source_path.is_some() {
                    eprintln!("error: multiple source files given");
                    return ExitCode::FAILURE;
                }
                source_path = Some(PathBuf::from(other));
            }
        }
    }

    let Some(source_path) = source_path else {
        eprint!("{USAGE}");
        return ExitCode::FAILURE;
    };

    let start = Instant::now();
    let mut compilation = Compilation::new(config.clone());
    let output = match compilation.build_file(&source_path) {
        Ok(output) => output,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let out_path = config
        .out_path
        .clone()
        .unwrap_or_else(|| source_path.with_extension("ll"));
    if let Err(err) = fs::write(&out_path, &output.ll_text) {
        eprintln!("error: unable to write '{}': {err}", out_path.display());
        return ExitCode::FAILURE;
    }
    if let (Some(header_path), Some(header)) = (&config.emit_header, &output.header_text) {
        if let Err(err) = fs::write(header_path, header) {
            eprintln!("error: unable to write '{}': {err}", header_path.display());
            return ExitCode::FAILURE;
        }
    }

    if config.verbose {
        let elapsed = start.elapsed();
        eprintln!("wrote {} in {elapsed:?}", out_path.display());
        // the link step is delegated to the system toolchain
        let mut link_line = format!("cc {}", out_path.display());
        for dir in &config.lib_dirs {
            link_line.push_str(&format!(" -L{}", dir.display()));
        }
        for lib in &config.libs {
            link_line.push_str(&format!(" -l{lib}"));
        }
        if config.link_libc {
            link_line.push_str(" -lc");
        }
        if config.rdynamic {
            link_line.push_str(" -rdynamic");
        }
        eprintln!("link with: {link_line}");
    }
    ExitCode::SUCCESS
}
