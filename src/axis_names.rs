/// Centralized axis naming utilities
///
/// Provides consistent axis names for reports and for the firmware CLI keys
/// (`p_roll`, `d_pitch`, ...) built by the recommenders.
pub const AXIS_COUNT: usize = 3;

/// Display names, indexed 0=Roll, 1=Pitch, 2=Yaw
pub const AXIS_NAMES: [&str; AXIS_COUNT] = ["Roll", "Pitch", "Yaw"];

/// Lowercase suffixes used in firmware setting names
pub const AXIS_KEYS: [&str; AXIS_COUNT] = ["roll", "pitch", "yaw"];

/// Get the display name for an axis index, or "Unknown" when out of range
pub fn axis_name(index: usize) -> &'static str {
    AXIS_NAMES.get(index).copied().unwrap_or("Unknown")
}

/// Build a per-axis firmware setting key, e.g. `("p", 0)` -> `p_roll`
pub fn axis_setting(prefix: &str, index: usize) -> String {
    let key = AXIS_KEYS.get(index).copied().unwrap_or("unknown");
    format!("{}_{}", prefix, key)
}
