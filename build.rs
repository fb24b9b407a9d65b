// The linker scripts only exist for the ESP32-C3 target. Host builds (unit
// tests of the transport-agnostic core) must not see them.
fn main() {
    let arch = std::env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();

    if arch == "riscv32" {
        println!("cargo:rustc-link-arg-bins=-Tlinkall.x");
        println!("cargo:rustc-link-arg-bins=-Trom_functions.x");
        println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
    }
}
