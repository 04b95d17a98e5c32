//! Build script for camera-capture
//!
//! Points the linker at the native driver shim when the `openni`
//! feature is enabled.

fn main() {
    println!("cargo:rerun-if-env-changed=RGBD_SHIM_DIR");

    if std::env::var_os("CARGO_FEATURE_OPENNI").is_none() {
        return;
    }

    // librgbd_shim is expected on the default search path otherwise
    if let Some(dir) = std::env::var_os("RGBD_SHIM_DIR") {
        println!("cargo:rustc-link-search=native={}", dir.to_string_lossy());
    }
}
