//! HTTP readiness probe on top of `reqwest`.

use std::time::Duration;

use reqwest::{Client, StatusCode, Url, redirect};

/// Parses a probe target into an absolute `http://` URL.
///
/// Accepts `http://host:port/path`, scheme-relative `//host:port/path` and bare `host:port/path`.
pub(crate) fn parse_target(target: &str) -> Option<Url> {
    let candidate = if target.contains("://") {
        target.to_string()
    } else if let Some(rest) = target.strip_prefix("//") {
        format!("http://{rest}")
    } else {
        format!("http://{target}")
    };
    let url = Url::parse(&candidate).ok()?;
    (url.scheme() == "http" && url.host().is_some()).then_some(url)
}

/// Sends one `GET` bounded by `limit`. Redirects are not followed.
pub(crate) async fn get_status(url: Url, limit: Duration) -> reqwest::Result<StatusCode> {
    let client = Client::builder()
        .timeout(limit)
        .redirect(redirect::Policy::none())
        .build()?;
    let resp = client.get(url).send().await?;
    Ok(resp.status())
}
