//! One-shot execution from the command line.
//!
//! Guest stdout streams to the terminal as it is written. Stderr, the exit
//! code and the status code are printed to stderr once the guest finishes.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use webfunc_sandbox::request::canonical_header_name;
use webfunc_sandbox::{RequestMetadata, SandboxSession, SessionReport};
use webfunc_telemetry::{RequestContext, RequestGuard};

/// A request assembled from command-line flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InvokeArgs {
    pub(crate) method: String,
    pub(crate) path: String,
    pub(crate) query: String,
    /// Raw `Name: value` strings.
    pub(crate) headers: Vec<String>,
    /// Body file; `-` reads standard input.
    pub(crate) body: Option<PathBuf>,
}

impl InvokeArgs {
    fn request(&self) -> Result<RequestMetadata> {
        let mut request = RequestMetadata::new(self.method.to_ascii_uppercase(), self.path.as_str())
            .with_query(self.query.as_str());
        for raw in &self.headers {
            let (name, value) = parse_header(raw)?;
            request.push_header(canonical_header_name(name), value);
        }
        Ok(request)
    }

    fn read_body(&self) -> Result<Vec<u8>> {
        match &self.body {
            None => Ok(Vec::new()),
            Some(path) if path.as_os_str() == "-" => {
                let mut body = Vec::new();
                std::io::Read::read_to_end(&mut std::io::stdin(), &mut body)
                    .context("failed to read body from stdin")?;
                Ok(body)
            },
            Some(path) => std::fs::read(path)
                .with_context(|| format!("failed to read body from {}", path.display())),
        }
    }
}

/// Split `Name: value`.
fn parse_header(raw: &str) -> Result<(&str, &str)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("header '{raw}' is not in 'Name: value' form");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("header '{raw}' has an empty name");
    }
    Ok((name, value.trim()))
}

/// Run the guest once and return its exit code.
pub(crate) async fn run(session: SandboxSession, args: &InvokeArgs) -> Result<u32> {
    let request = args.request()?;
    let body = args.read_body()?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling guest");
            on_interrupt.cancel();
        }
    });

    let report = tokio::task::spawn_blocking(move || {
        let mut guard = RequestGuard::new(RequestContext::new(
            request.method.as_str(),
            request.path.as_str(),
        ));
        let report = session.run(&request, body, std::io::stdout(), Some(cancel))?;
        guard.set_status(report.status_code().unwrap_or(200));
        Ok::<_, webfunc_sandbox::SandboxError>(report)
    })
    .await
    .context("session task failed")?;
    interrupt.abort();

    let report = report.context("guest did not finish")?;
    let mut stderr = std::io::stderr().lock();
    print_summary(&mut stderr, &report)?;
    Ok(report.exit_code)
}

fn print_summary(out: &mut impl Write, report: &SessionReport) -> std::io::Result<()> {
    writeln!(out)?;
    writeln!(out, "---[ stderr ]------")?;
    out.write_all(&report.stderr)?;
    if !report.stderr.ends_with(b"\n") && !report.stderr.is_empty() {
        writeln!(out)?;
    }
    writeln!(out, "---[ exit code ]---")?;
    writeln!(out, "{}", report.exit_code)?;
    writeln!(out, "---[ status ]------")?;
    match report.status_code() {
        Some(code) => writeln!(out, "{code}")?,
        None => writeln!(out, "(unset)")?,
    }
    for (name, content) in &report.outputs {
        if name != webfunc_sandbox::vfs::contract::STATUS_CODE_FILE {
            writeln!(out, "---[ {name} ]---")?;
            writeln!(out, "{}", String::from_utf8_lossy(content))?;
        }
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn args() -> InvokeArgs {
        InvokeArgs {
            method: "get".into(),
            path: "/hello".into(),
            query: "z=1&a=2".into(),
            headers: vec!["x-api-key: secret".into(), "Accept:text/html".into()],
            body: None,
        }
    }

    #[test]
    fn request_from_flags() {
        let request = args().request().unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/hello");
        assert_eq!(request.canonical_query(), "a=2&z=1");
        assert_eq!(request.headers.get("X-Api-Key"), Some(&vec!["secret".to_owned()]));
        assert_eq!(request.headers.get("Accept"), Some(&vec!["text/html".to_owned()]));
    }

    #[test]
    fn header_without_colon_is_rejected() {
        let mut a = args();
        a.headers = vec!["broken".into()];
        assert!(a.request().is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn header_value_keeps_colons() {
        assert_eq!(
            parse_header("Host: localhost:8080").unwrap(),
            ("Host", "localhost:8080")
        );
    }

    #[test]
    fn body_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body.json");
        std::fs::write(&path, br#"{"k":1}"#).unwrap();
        let mut a = args();
        a.body = Some(path);
        assert_eq!(a.read_body().unwrap(), br#"{"k":1}"#);
        assert!(args().read_body().unwrap().is_empty());
    }

    #[test]
    fn summary_lists_outputs() {
        let report = SessionReport {
            stdout: b"ignored".to_vec(),
            stderr: b"oops".to_vec(),
            exit_code: 2,
            outputs: BTreeMap::from([
                ("status_code".to_owned(), b"418".to_vec()),
                ("content_type".to_owned(), b"text/plain".to_vec()),
            ]),
        };
        let mut out = Vec::new();
        print_summary(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("---[ stderr ]------\noops\n"));
        assert!(text.contains("---[ exit code ]---\n2\n"));
        assert!(text.contains("---[ status ]------\n418\n"));
        assert!(text.contains("---[ content_type ]---\ntext/plain\n"));
        assert!(!text.contains("ignored"));
    }
}
