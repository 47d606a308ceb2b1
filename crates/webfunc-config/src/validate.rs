//! Post-merge configuration validation.

use std::collections::BTreeSet;
use std::net::SocketAddr;

use webfunc_vfs::contract::{HEADERS_FILE, METHOD_FILE, PATH_FILE, QUERY_FILE, STATUS_CODE_FILE};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Names the request builder always creates; an output may not shadow them.
const RESERVED_FILES: [&str; 5] = [
    HEADERS_FILE,
    METHOD_FILE,
    PATH_FILE,
    QUERY_FILE,
    STATUS_CODE_FILE,
];

/// Largest memory ceiling accepted: 4 GiB of 64 KiB pages.
const MAX_MEMORY_PAGES: u32 = 65_536;

/// Validate a fully merged configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_server(config)?;
    validate_sandbox(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_server(config: &Config) -> ConfigResult<()> {
    let s = &config.server;
    if s.bind_addr.parse::<SocketAddr>().is_err() {
        return Err(invalid(
            "server.bind_addr",
            format!("'{}' is not a valid host:port socket address", s.bind_addr),
        ));
    }
    if s.max_body_bytes == 0 {
        return Err(invalid("server.max_body_bytes", "must be greater than zero"));
    }
    Ok(())
}

fn validate_sandbox(config: &Config) -> ConfigResult<()> {
    let s = &config.sandbox;

    if !s.mount_path.starts_with('/') {
        return Err(invalid(
            "sandbox.mount_path",
            format!("'{}' must be an absolute path", s.mount_path),
        ));
    }
    if s.mount_path.len() > 1 && s.mount_path.ends_with('/') {
        return Err(invalid(
            "sandbox.mount_path",
            format!("'{}' must not end with '/'", s.mount_path),
        ));
    }
    if s.mount_path == "/" {
        return Err(invalid("sandbox.mount_path", "cannot mount over the guest root"));
    }
    if s.mode.trim().is_empty() {
        return Err(invalid("sandbox.mode", "must not be empty"));
    }
    if s.entrypoint.trim().is_empty() {
        return Err(invalid("sandbox.entrypoint", "must not be empty"));
    }
    if s.timeout_ms == 0 {
        return Err(invalid("sandbox.timeout_ms", "must be greater than zero"));
    }
    if s.max_memory_pages == 0 || s.max_memory_pages > MAX_MEMORY_PAGES {
        return Err(invalid(
            "sandbox.max_memory_pages",
            format!(
                "{} is out of range; must be between 1 and {MAX_MEMORY_PAGES}",
                s.max_memory_pages
            ),
        ));
    }
    let mut seen = BTreeSet::new();
    for name in &s.outputs {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(invalid(
                "sandbox.outputs",
                format!("'{name}' is not a valid flat file name"),
            ));
        }
        if RESERVED_FILES.contains(&name.as_str()) {
            return Err(invalid(
                "sandbox.outputs",
                format!("'{name}' is reserved for request metadata"),
            ));
        }
        if !seen.insert(name.as_str()) {
            return Err(invalid("sandbox.outputs", format!("'{name}' is listed twice")));
        }
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;
    if !matches!(
        l.format.to_ascii_lowercase().as_str(),
        "pretty" | "compact" | "json" | "full"
    ) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported format '{}'; expected one of: pretty, compact, json, full",
                l.format
            ),
        ));
    }
    if l.level.trim().is_empty() {
        return Err(invalid("logging.level", "must not be empty"));
    }
    Ok(())
}
