use extism::{CurrentPlugin, Error, UserData, Val};
use tracing::debug;

use crate::engine::wasm::host::util;
use crate::engine::wasm::host_state::HostState;

#[allow(clippy::needless_pass_by_value)]
pub(crate) fn webfunc_random_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let len = util::get_u64(plugin, &inputs[0])?;

    let ud = user_data.get()?;
    let mut state = ud.lock().map_err(util::poisoned)?;
    let bytes = state.random_bytes(len);
    drop(state);

    util::set_output(plugin, outputs, bytes)
}

/// Records the exit code, then fails the call so the guest unwinds.
/// The engine reads the recorded code back and reports a clean exit.
#[allow(clippy::needless_pass_by_value)]
pub(crate) fn webfunc_exit_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    _outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let raw = util::get_u64(plugin, &inputs[0])?;
    let code = u32::try_from(raw).unwrap_or(u32::MAX);

    let ud = user_data.get()?;
    let mut state = ud.lock().map_err(util::poisoned)?;
    state.record_exit(code);
    drop(state);

    debug!(code, "guest requested exit");
    Err(Error::msg(format!("guest exited with code {code}")))
}
