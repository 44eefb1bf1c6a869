//! Application configuration
//!
//! One explicit struct built from the environment at startup and handed to
//! the services that need it. No ambient globals.

use anyhow::Result;
use std::env;
use std::path::PathBuf;

/// Process-wide configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub auth_db_path: String,
    pub records_db_path: String,
    pub jwt_secret: String,
    pub upload_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .unwrap_or(3000);

        let auth_db_path = resolve_data_path(env::var("AUTH_DB_PATH").ok(), "spendbook_auth.db");

        let records_db_path = resolve_data_path(
            env::var("RECORDS_DB_PATH")
                .or_else(|_| env::var("DB_PATH"))
                .ok(),
            "spendbook_records.db",
        );

        let jwt_secret = env::var("JWT_SECRET")
            .unwrap_or_else(|_| "dev-secret-change-in-production-minimum-32-characters".to_string());

        let upload_dir = resolve_data_path(env::var("UPLOAD_DIR").ok(), "uploads");

        Ok(Self {
            port,
            auth_db_path,
            records_db_path,
            jwt_secret,
            upload_dir,
        })
    }
}

fn default_data_path(filename: &str) -> String {
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    base.join(filename).to_string_lossy().to_string()
}

fn resolve_data_path(env_value: Option<String>, default_filename: &str) -> String {
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let Some(raw) = env_value.filter(|v| !v.trim().is_empty()) else {
        return default_data_path(default_filename);
    };

    let p = PathBuf::from(raw);
    if p.is_absolute() {
        return p.to_string_lossy().to_string();
    }

    // Treat relative paths as relative to the crate root, not the caller's cwd.
    base.join(p).to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_data_path_defaults() {
        let path = resolve_data_path(None, "test.db");
        assert!(path.ends_with("test.db"));

        let path = resolve_data_path(Some("  ".to_string()), "test.db");
        assert!(path.ends_with("test.db"));
    }

    #[test]
    fn test_resolve_data_path_absolute_passthrough() {
        let path = resolve_data_path(Some("/tmp/custom.db".to_string()), "test.db");
        assert_eq!(path, "/tmp/custom.db");
    }
}
