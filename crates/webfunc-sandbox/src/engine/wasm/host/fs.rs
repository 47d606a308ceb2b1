use extism::{CurrentPlugin, Error, UserData, Val};
use webfunc_vfs::contract;

use crate::engine::wasm::host::util;
use crate::engine::wasm::host_state::HostState;

#[allow(clippy::needless_pass_by_value)]
pub(crate) fn webfunc_open_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let path = util::get_path(plugin, &inputs[0])?;

    let ud = user_data.get()?;
    let mut state = ud.lock().map_err(util::poisoned)?;
    let result = state.open(&path).map(|id| contract::encode_u64(id).to_vec());
    drop(state);

    util::set_result(plugin, outputs, result)
}

#[allow(clippy::needless_pass_by_value)]
pub(crate) fn webfunc_read_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let handle = util::get_u64(plugin, &inputs[0])?;
    let max_len = util::get_u64(plugin, &inputs[1])?;

    let ud = user_data.get()?;
    let mut state = ud.lock().map_err(util::poisoned)?;
    let result = state.read(handle, max_len);
    drop(state);

    util::set_result(plugin, outputs, result)
}

#[allow(clippy::needless_pass_by_value)]
pub(crate) fn webfunc_write_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let handle = util::get_u64(plugin, &inputs[0])?;
    let data = util::get_safe_bytes(plugin, &inputs[1], util::MAX_GUEST_PAYLOAD_LEN)?;

    let ud = user_data.get()?;
    let mut state = ud.lock().map_err(util::poisoned)?;
    let result = state
        .write(handle, &data)
        .map(|n| contract::encode_u64(n).to_vec());
    drop(state);

    util::set_result(plugin, outputs, result)
}

#[allow(clippy::needless_pass_by_value)]
pub(crate) fn webfunc_stat_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let handle = util::get_u64(plugin, &inputs[0])?;

    let ud = user_data.get()?;
    let state = ud.lock().map_err(util::poisoned)?;
    let result = state.stat(handle);
    drop(state);

    util::set_result(plugin, outputs, result)
}

#[allow(clippy::needless_pass_by_value)]
pub(crate) fn webfunc_close_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let handle = util::get_u64(plugin, &inputs[0])?;

    let ud = user_data.get()?;
    let mut state = ud.lock().map_err(util::poisoned)?;
    let result = state.close(handle).map(|()| Vec::new());
    drop(state);

    util::set_result(plugin, outputs, result)
}

#[allow(clippy::needless_pass_by_value)]
pub(crate) fn webfunc_readdir_impl(
    plugin: &mut CurrentPlugin,
    _inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let ud = user_data.get()?;
    let state = ud.lock().map_err(util::poisoned)?;
    let listing = state.read_dir();
    drop(state);

    util::set_output(plugin, outputs, listing)
}
