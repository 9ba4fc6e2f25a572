use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "takeoff";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default extraction endpoint (a locally hosted extraction service).
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080";

/// Default model name sent to the extraction endpoint.
pub const DEFAULT_MODEL: &str = "takeoff-extractor";

/// Default per-attempt HTTP timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default chunk window and overlap, in the character unit the extraction
/// budget is expressed in.
pub const DEFAULT_CHUNK_SIZE: usize = 6_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 600;

/// Get the application data directory (~/.takeoff)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join(".takeoff")
}

/// Default location of the extraction cache database.
pub fn default_cache_path() -> PathBuf {
    app_data_dir().join("extraction-cache.db")
}

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    format!("info,{APP_NAME}=debug")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_under_home() {
        let dir = app_data_dir();
        let home = dirs::home_dir().unwrap();
        assert!(dir.starts_with(home));
        assert!(dir.ends_with(".takeoff"));
    }

    #[test]
    fn cache_path_under_app_data() {
        let cache = default_cache_path();
        assert!(cache.starts_with(app_data_dir()));
    }

    #[test]
    fn overlap_smaller_than_chunk() {
        assert!(DEFAULT_CHUNK_OVERLAP < DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
