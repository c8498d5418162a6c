use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use ridealong_core::transit::network::DataFetcher;
use ridealong_core::transit::TransitError;
use tracing::debug;

/// Serves `<url path>.json` from disk in place of a network transport.
///
/// `file:` prefixes and query strings are dropped, so
/// `fixtures/bustime/stoptimes?rt=4` reads `fixtures/bustime/stoptimes.json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileFetcher;

impl FileFetcher {
    pub fn path_for(url: &str) -> PathBuf {
        let path = url.split('?').next().unwrap_or(url);
        let path = path
            .strip_prefix("file://")
            .or_else(|| path.strip_prefix("file:"))
            .unwrap_or(path);
        PathBuf::from(format!("{path}.json"))
    }
}

impl DataFetcher for FileFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = ridealong_core::transit::Result<Vec<u8>>> + Send + 'a>> {
        Box::pin(async move {
            let path = Self::path_for(url);
            debug!(url, path = %path.display(), "reading payload");
            tokio::fs::read(&path).await.map_err(|error| TransitError::Fetch {
                url: url.to_string(),
                message: format!("{}: {error}", path.display()),
            })
        })
    }
}
