//! Utility functions for WASM host implementations.

use extism::{CurrentPlugin, Error, Val};
use webfunc_vfs::contract::{self, Status};

/// Maximum allowed length for a guest payload (16 MB).
pub const MAX_GUEST_PAYLOAD_LEN: u64 = 16 * 1024 * 1024;

/// Maximum allowed length for file paths (4 KB).
pub const MAX_PATH_LEN: u64 = 4 * 1024;

/// Maximum allowed length for an encoded number argument.
pub const MAX_NUMBER_LEN: u64 = 8;

/// Largest buffer handed back by a single read call (64 KB).
pub const MAX_READ_CHUNK: usize = 64 * 1024;

/// Extract raw bytes from guest memory safely by enforcing a length limit before allocation.
///
/// # Errors
/// Returns an error if the value is not a valid pointer or if the memory allocation
/// exceeds the specified limit.
#[allow(clippy::cast_sign_loss)]
pub fn get_safe_bytes(plugin: &mut CurrentPlugin, val: &Val, limit: u64) -> Result<Vec<u8>, Error> {
    let ptr = match val {
        Val::I64(v) => *v as u64,
        Val::I32(v) => u64::from(*v as u32),
        _ => return Err(Error::msg("expected memory pointer value")),
    };

    let len = plugin.memory_length(ptr)?;
    if len > limit {
        return Err(Error::msg(format!(
            "memory allocation of {len} bytes exceeds maximum allowed limit of {limit} bytes"
        )));
    }

    #[allow(clippy::cast_possible_wrap)]
    let safe_val = Val::I64(ptr as i64);
    plugin.memory_get_val(&safe_val)
}

/// Extract a little-endian `u64` argument from guest memory.
///
/// # Errors
/// Returns an error if the value is not a valid pointer or is longer than 8 bytes.
pub fn get_u64(plugin: &mut CurrentPlugin, val: &Val) -> Result<u64, Error> {
    let bytes = get_safe_bytes(plugin, val, MAX_NUMBER_LEN)?;
    Ok(contract::decode_u64(&bytes))
}

/// Extract a path argument from guest memory. Invalid UTF-8 is replaced.
///
/// # Errors
/// Returns an error if the value is not a valid pointer or exceeds [`MAX_PATH_LEN`].
pub fn get_path(plugin: &mut CurrentPlugin, val: &Val) -> Result<String, Error> {
    let bytes = get_safe_bytes(plugin, val, MAX_PATH_LEN)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Copy `bytes` into guest memory and store the pointer in `outputs[0]`.
///
/// # Errors
/// Returns an error if guest memory cannot be allocated.
pub fn set_output(plugin: &mut CurrentPlugin, outputs: &mut [Val], bytes: Vec<u8>) -> Result<(), Error> {
    let mem = plugin.memory_new(bytes)?;
    outputs[0] = plugin.memory_to_val(mem);
    Ok(())
}

/// Frame `result` with its status byte and store it in `outputs[0]`.
///
/// # Errors
/// Returns an error if guest memory cannot be allocated.
pub fn set_result(
    plugin: &mut CurrentPlugin,
    outputs: &mut [Val],
    result: Result<Vec<u8>, Status>,
) -> Result<(), Error> {
    let framed = match result {
        Ok(payload) => contract::encode_result(Status::Ok, &payload),
        Err(status) => contract::encode_result(status, &[]),
    };
    set_output(plugin, outputs, framed)
}

/// Lock poisoning is reported to the guest as a trap.
pub(crate) fn poisoned<E: std::fmt::Display>(e: E) -> Error {
    Error::msg(format!("host state lock poisoned: {e}"))
}
