//! Library version and compile-time feature queries.

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compile-time selectable decoder features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// x87 FPU escape range (D8-DF) decoding.
    X87,
    /// Serde derives on the public data model.
    Serde,
}

/// Returns true if the given feature was enabled at build time.
pub fn is_feature_enabled(feature: Feature) -> bool {
    match feature {
        Feature::X87 => cfg!(feature = "x87"),
        Feature::Serde => cfg!(feature = "serde"),
    }
}
