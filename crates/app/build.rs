// Copyright 2025-2026 CEMAXECUTER LLC

fn main() {
    // librtlsdr installed from source lands in /usr/local/lib, which the
    // linker does not search by default on every distro.
    #[cfg(feature = "rtlsdr")]
    {
        let local_lib_dir = "/usr/local/lib";
        if std::path::Path::new(local_lib_dir).is_dir() {
            println!("cargo:rustc-link-search=native={}", local_lib_dir);
            println!("cargo:rustc-link-arg=-Wl,-rpath,{}", local_lib_dir);
        }
    }
}
