// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Build script for the Rustux hypervisor image
//!
//! Assembles the reset entry and wires in the linker script when building
//! the bare-metal ARM64 image. Host builds (unit tests) skip both.

use std::env;
use std::path::PathBuf;

fn main() {
    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();

    if target_arch == "aarch64" && target_os == "none" {
        build_arm64_entry();
        configure_linker_arm64();
    }
}

fn configure_linker_arm64() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let script = manifest_dir.join("src/kernel/arch/arm64/hypervisor.ld");

    println!("cargo:rustc-link-arg=-T{}", script.display());
    println!("cargo:rustc-link-arg=--entry=_start");
    println!("cargo:rerun-if-changed={}", script.display());
}

fn build_arm64_entry() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());

    let asm_sources = ["src/kernel/arch/arm64/start.S"];

    let mut cc_build = cc::Build::new();
    for src in &asm_sources {
        cc_build.file(manifest_dir.join(src));
    }

    cc_build
        .warnings(true)
        .flag("-ffreestanding")
        .flag("-nostdlib")
        .flag("-march=armv8-a")
        .define("__RUSTUX_HYP__", None);

    cc_build.compile("start");

    for src in &asm_sources {
        println!("cargo:rerun-if-changed={}", manifest_dir.join(src).display());
    }
}
