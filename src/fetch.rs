//! ICS fetcher (§6 "Inbound: ICS fetcher... HTTP GET -> bytes"), grounded
//! on `caldir-provider-webcal`'s plain `reqwest::get` fetch. `calsched-core`
//! itself never does I/O here - this lives in the CLI binary only.

use anyhow::{Context, Result};

pub async fn fetch_calendar_bytes(source: &str) -> Result<Vec<u8>> {
    if let Some(rest) = source.strip_prefix("file://") {
        return Ok(std::fs::read(rest).with_context(|| format!("reading calendar file '{rest}'"))?);
    }
    if source.starts_with("http://") || source.starts_with("https://") {
        let response = reqwest::get(source)
            .await
            .with_context(|| format!("fetching calendar source '{source}'"))?
            .error_for_status()
            .with_context(|| format!("calendar source '{source}' returned an error status"))?;
        return Ok(response.bytes().await?.to_vec());
    }
    Ok(std::fs::read(source).with_context(|| format!("reading calendar file '{source}'"))?)
}
