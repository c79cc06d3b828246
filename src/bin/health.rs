use std::env;

use anyhow::{bail, Result};
use reqwest::Url;

const DEFAULT_URL: &str = "http://127.0.0.1:25566/";

/// Exits non-zero unless the runner answers a GET with 200.
fn main() -> Result<()> {
    let url = env::args().nth(1).unwrap_or_else(|| DEFAULT_URL.to_string());
    let url = Url::parse(&url)?;

    let response = reqwest::blocking::get(url.clone())?;
    if !response.status().is_success() {
        bail!("Health check against {} failed with {}", url, response.status());
    }

    Ok(())
}
