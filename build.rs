// build.rs
// Optimize release binaries for the CPU of the build host.

use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Only release builds get host-specific codegen; debug builds keep the
    // portable compiler defaults.
    let profile = env::var("PROFILE").unwrap_or_else(|_| "debug".to_string());
    if profile == "release" {
        println!("cargo:rustc-flags=-C target-cpu=native");
    }
}
