fn main() {
    // The napi prelude is only wired up when the host editor builds the
    // addon with the `napi` feature enabled.
    if std::env::var_os("CARGO_FEATURE_NAPI").is_some() {
        napi_build::setup();
    }
}
