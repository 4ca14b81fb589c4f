use crate::error::{BundleError, Result};
use fantoccini::{Client, ClientBuilder};
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

/// Common alternative WebDriver addresses tried after the configured one
const FALLBACK_WEBDRIVER_URLS: [&str; 4] = [
    "http://localhost:9515", // ChromeDriver default
    "http://localhost:4723", // Appium default
    "http://localhost:9222", // Chrome debug port default
    "http://127.0.0.1:4444", // Try with IP instead of localhost
];

/// Load `page` in a WebDriver session and return the DOM after scripts ran
pub async fn render_page(page: &Url, webdriver_url: &str) -> Result<String> {
    ::log::info!("Rendering {} through WebDriver", page);

    let client = connect_to_webdriver(webdriver_url).await.ok_or_else(|| {
        BundleError::WebDriver(format!(
            "no WebDriver server reachable at {webdriver_url}; start one or set WEBDRIVER_URL"
        ))
    })?;

    let captured = timeout(Duration::from_secs(45), async {
        client.goto(page.as_str()).await?;
        Ok::<String, fantoccini::error::CmdError>(client.source().await?)
    })
    .await;

    if let Err(e) = client.close().await {
        ::log::warn!("Failed to close WebDriver session: {}", e);
    }

    match captured {
        Ok(Ok(source)) => Ok(source),
        Ok(Err(e)) => Err(BundleError::WebDriver(format!("rendering {page}: {e}"))),
        Err(_) => Err(BundleError::WebDriver(format!("timed out rendering {page}"))),
    }
}

/// Connects to the WebDriver instance, falling back to well-known addresses
async fn connect_to_webdriver(webdriver_url: &str) -> Option<Client> {
    match ClientBuilder::native().connect(webdriver_url).await {
        Ok(client) => {
            ::log::debug!("Connected to WebDriver at {}", webdriver_url);
            return Some(client);
        }
        Err(e) => {
            ::log::error!(
                "Failed to connect to WebDriver at {}: {}",
                webdriver_url,
                e
            );
        }
    }

    for url in FALLBACK_WEBDRIVER_URLS {
        if url == webdriver_url {
            continue;
        }

        ::log::info!("Trying fallback WebDriver URL: {}", url);
        if let Ok(client) = ClientBuilder::native().connect(url).await {
            ::log::debug!("Connected to fallback WebDriver at {}", url);
            return Some(client);
        }
    }

    ::log::error!("Failed to connect to any WebDriver servers");
    None
}
