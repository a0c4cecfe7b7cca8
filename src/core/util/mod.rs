use std::fmt::Debug;

use anyhow::Context;
use anyhow::Result;
use async_trait::async_trait;
use http::{Method, Request, Response};

/// Generic HTTP client.
///
/// A trait is used here so that status lists and DID documents can be fetched through whichever
/// HTTP stack the host application provides, and so that tests can serve fixtures.
#[async_trait]
pub trait AsyncHttpClient: Debug {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

pub(crate) fn base_request() -> http::request::Builder {
    Request::builder().header("User-Agent", concat!("openid4vp-verifier/", env!("CARGO_PKG_VERSION")))
}

/// Issue a `GET` and return the body of a successful response.
pub(crate) async fn get_body<C: AsyncHttpClient + Send + Sync + ?Sized>(
    http_client: &C,
    url: &str,
    accept: &str,
) -> Result<Vec<u8>> {
    let request = base_request()
        .method(Method::GET)
        .uri(url)
        .header("Accept", accept)
        .body(vec![])
        .context("failed to build request")?;

    let response = http_client
        .execute(request)
        .await
        .context(format!("request to '{url}' failed"))?;

    if !response.status().is_success() {
        anyhow::bail!("request to '{url}' returned status {}", response.status())
    }

    Ok(response.into_body())
}

#[derive(Debug)]
pub struct ReqwestClient(reqwest::Client);

impl AsRef<reqwest::Client> for ReqwestClient {
    fn as_ref(&self) -> &reqwest::Client {
        &self.0
    }
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .context("unable to build http_client")
            .map(Self)
    }
}

#[async_trait]
impl AsyncHttpClient for ReqwestClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let response = self
            .0
            .execute(request.try_into().context("unable to convert request")?)
            .await
            .context("http request failed")?;

        let mut builder = Response::builder()
            .status(response.status())
            .version(response.version());

        builder
            .extensions_mut()
            .context("unable to set extensions")?
            .extend(response.extensions().clone());

        builder
            .headers_mut()
            .context("unable to set headers")?
            .extend(response.headers().clone());

        builder
            .body(
                response
                    .bytes()
                    .await
                    .context("failed to extract response body")?
                    .to_vec(),
            )
            .context("unable to construct response")
    }
}
