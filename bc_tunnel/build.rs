//! Links against the prebuilt Bambu tunnel shared library. The library
//! itself ships as part of the printer vendor's SDK and is not fetched
//! from crates.io; callers point `BAMBU_SOURCE_LIB_DIR` at wherever it
//! was unpacked (default: `/opt/bambu-source/lib`, matching the layout
//! the printer vendor distributes).

use std::env;
use std::path::PathBuf;

fn main() {
    let lib_dir = env::var("BAMBU_SOURCE_LIB_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/opt/bambu-source/lib"));

    println!("cargo:rustc-link-search=native={}", lib_dir.display());
    println!("cargo:rustc-link-lib=dylib=BambuSource");
    println!("cargo:rerun-if-env-changed=BAMBU_SOURCE_LIB_DIR");
}
