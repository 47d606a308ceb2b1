use extism::{CurrentPlugin, Error, UserData, Val};

use crate::engine::wasm::host::util;
use crate::engine::wasm::host_state::HostState;

#[allow(clippy::needless_pass_by_value)]
pub(crate) fn webfunc_stdin_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let max_len = util::get_u64(plugin, &inputs[0])?;

    let ud = user_data.get()?;
    let mut state = ud.lock().map_err(util::poisoned)?;
    let chunk = state.read_stdin(max_len);
    drop(state);

    util::set_output(plugin, outputs, chunk)
}

#[allow(clippy::needless_pass_by_value)]
pub(crate) fn webfunc_stdout_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    _outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let data = util::get_safe_bytes(plugin, &inputs[0], util::MAX_GUEST_PAYLOAD_LEN)?;

    let ud = user_data.get()?;
    let mut state = ud.lock().map_err(util::poisoned)?;
    state
        .write_stdout(&data)
        .map_err(|e| Error::msg(format!("stdout write failed: {e}")))
}

#[allow(clippy::needless_pass_by_value)]
pub(crate) fn webfunc_stderr_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    _outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let data = util::get_safe_bytes(plugin, &inputs[0], util::MAX_GUEST_PAYLOAD_LEN)?;

    let ud = user_data.get()?;
    let mut state = ud.lock().map_err(util::poisoned)?;
    state
        .write_stderr(&data)
        .map_err(|e| Error::msg(format!("stderr write failed: {e}")))
}
