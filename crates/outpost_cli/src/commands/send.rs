//! Send command implementation.

use crate::network::ReqwestNetwork;
use outpost_engine::{DataDir, EngineConfig, Network, Request};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the send command.
pub fn run(
    path: &Path,
    config: EngineConfig,
    method: &str,
    url: &str,
    headers: &[String],
    body: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let target = if url.contains("://") {
        url.to_string()
    } else {
        config.resolve(url)?.to_string()
    };
    let mut request = Request::parse(method, &target)?;
    for header in headers {
        let (name, value) = parse_header(header)?;
        request = request.with_header(name, value);
    }
    if let Some(body) = body {
        request = request.with_body(body);
    }

    let data = DataDir::open(path, true)?;
    let network = Arc::new(ReqwestNetwork::new(REQUEST_TIMEOUT)?);
    let engine = data.open_engine(config, network.clone())?;

    let strategy = engine.classify(&request);
    let response = match engine.handle_fetch(&request) {
        Some(response) => response,
        None => network.fetch(&request)?,
    };

    eprintln!("{strategy:?} -> {}", response.status);
    for (name, value) in response.headers.iter() {
        eprintln!("{name}: {value}");
    }
    println!("{}", response.text());
    Ok(())
}

/// Splits a `NAME:VALUE` header argument.
pub fn parse_header(raw: &str) -> Result<(&str, &str), String> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value.trim())),
        _ => Err(format!("invalid header {raw:?} (expected NAME:VALUE)")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_arguments() {
        assert_eq!(parse_header("Content-Type: application/json").unwrap(), ("Content-Type", "application/json"));
        assert_eq!(parse_header("x-trace:a:b").unwrap(), ("x-trace", "a:b"));
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(":value").is_err());
    }
}
