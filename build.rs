//! Purpose: Compile the native volume backend into the shared library embedded by the crate.
//! Role: Cargo build-script; drives the `cc`-discovered C compiler in link mode.
//! Invariants: Output lands in `OUT_DIR/payload/<platform file name>`; `VOLCTL_PAYLOAD_NAME` and
//! `VOLCTL_PAYLOAD_PATH` are exported only together with the `volctl_payload` cfg.
//! Invariants: `VOLCTL_SKIP_NATIVE=1` builds without a payload (runtime reports it missing).
//! Invariants: Uses only Cargo-provided env vars (e.g. `CARGO_MANIFEST_DIR`).
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    println!("cargo::rustc-check-cfg=cfg(volctl_payload)");
    println!("cargo:rerun-if-changed=native/volctl_alsa.c");
    println!("cargo:rerun-if-changed=native/volctl_win.c");
    println!("cargo:rerun-if-env-changed=VOLCTL_SKIP_NATIVE");

    if env::var_os("VOLCTL_SKIP_NATIVE").is_some_and(|value| value == "1") {
        println!("cargo:warning=VOLCTL_SKIP_NATIVE=1: building without the native volume backend");
        return;
    }

    let target = env::var("TARGET").unwrap_or_default();
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));
    let payload_dir = out_dir.join("payload");
    fs::create_dir_all(&payload_dir).expect("failed to create payload output directory");

    let windows = target_os == "windows";
    let (source, file_name) = if windows {
        (manifest_dir.join("native").join("volctl_win.c"), "volctl.dll")
    } else {
        (manifest_dir.join("native").join("volctl_alsa.c"), "libvolctl.so")
    };
    let output = payload_dir.join(file_name);

    link_shared_library(&target, &target_os, &source, &output, &payload_dir);

    println!("cargo:rustc-cfg=volctl_payload");
    println!("cargo:rustc-env=VOLCTL_PAYLOAD_NAME={file_name}");
    println!("cargo:rustc-env=VOLCTL_PAYLOAD_PATH={}", output.display());
}

fn link_shared_library(target: &str, target_os: &str, source: &Path, output: &Path, work_dir: &Path) {
    let mut build = cc::Build::new();
    build.pic(true).warnings(false);
    let compiler = build.try_get_compiler().unwrap_or_else(|err| {
        panic!(
            "no C compiler found for target `{target}`; the native volume backend cannot be built.\n\
             Fix: install a C toolchain (set `CC` to override) or set VOLCTL_SKIP_NATIVE=1.\n\
             Underlying error: {err}"
        )
    });

    let mut command = compiler.to_command();
    command.current_dir(work_dir);
    if compiler.is_like_msvc() {
        command
            .arg("/nologo")
            .arg("/O2")
            .arg("/LD")
            .arg(source)
            .arg(format!("/Fe{}", output.display()))
            .arg("/link")
            .arg("ole32.lib");
    } else {
        command
            .arg("-shared")
            .arg("-fPIC")
            .arg("-O2")
            .arg("-o")
            .arg(output)
            .arg(source);
        match target_os {
            "windows" => {
                command.arg("-lole32");
            }
            "linux" | "android" | "freebsd" | "netbsd" | "openbsd" | "dragonfly" => {
                command.arg("-lm").arg("-ldl").arg("-lpthread");
            }
            _ => {}
        }
    }

    let status = command
        .status()
        .unwrap_or_else(|err| panic!("failed to run C compiler {:?}: {err}", compiler.path()));
    if !status.success() {
        panic!(
            "C compiler for target `{target}` failed to build {} ({status}).\n\
             Fix: make sure the platform audio headers are installed, or set VOLCTL_SKIP_NATIVE=1.",
            source.display()
        );
    }
}
