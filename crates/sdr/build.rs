fn main() {
    #[cfg(feature = "rtlsdr")]
    {
        println!("cargo:rustc-link-lib=rtlsdr");
    }
}
