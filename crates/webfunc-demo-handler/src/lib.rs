//! Example handler.
//!
//! Built as a `cdylib` targeting `wasm32-unknown-unknown` (or `wasm32-wasip1`)
//! and served with `webfunc serve --module target/.../webfunc_demo_handler.wasm`.
//!
//! | Path       | Behavior                                            |
//! |------------|-----------------------------------------------------|
//! | `/`        | Describes the request                               |
//! | `/echo`    | Echoes the body                                     |
//! | `/files`   | Lists the mounted files                             |
//! | `/random`  | 16 random bytes as hex                              |
//! | `/fail`    | Exits with code 3 after writing a partial response  |
//! | otherwise  | 404                                                 |

use std::fmt::Write as _;

use webfunc_sdk::prelude::*;

#[plugin_fn]
pub fn handle() -> FnResult<()> {
    let method = request::method()?;
    let path = request::path()?;
    let mut out = io::stdout();

    match path.as_str() {
        "/" => {
            response::set_status(200)?;
            writeln!(out, "{method} {path}")?;
            writeln!(out, "query: {}", request::query()?)?;
            for (name, value) in request::headers()? {
                writeln!(out, "{name}: {value}")?;
            }
            if let Some(mode) = env::mode()? {
                writeln!(out, "mode: {mode}")?;
            }
        },
        "/echo" => {
            response::set_status(200)?;
            out.write_all(&io::read_stdin_to_end()?)?;
        },
        "/files" => {
            response::set_status(200)?;
            for stat in fs::read_dir()? {
                writeln!(out, "{:o} {:>6} {}", stat.mode, stat.size, stat.name)?;
            }
        },
        "/random" => {
            let mut buf = [0u8; 16];
            random::fill(&mut buf)?;
            let hex = buf.iter().fold(String::new(), |mut s, b| {
                let _ = write!(s, "{b:02x}");
                s
            });
            writeln!(out, "{hex}")?;
        },
        "/fail" => {
            response::set_status(500)?;
            writeln!(out, "partial")?;
            writeln!(io::stderr(), "failing on purpose")?;
            exit(3);
        },
        _ => {
            response::set_status(404)?;
            writeln!(out, "no route for {path}")?;
        },
    }
    Ok(())
}
