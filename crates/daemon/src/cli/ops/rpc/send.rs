use clap::Args;

use common::rpc::{SyftMethod, SyftRequest, SyftUrl, DEFAULT_POLL_INTERVAL};

use super::{await_stored, endpoint, parse_header, std_duration, RpcOpError};

/// Write a request into the recipient's datasite.
#[derive(Args, Debug, Clone)]
pub struct SendRequest {
    /// Target, e.g. syft://bob@openmined.org/api_data/ping/rpc
    pub url: String,

    #[arg(long, short = 'X', default_value = "GET")]
    pub method: String,

    /// Header as name=value (repeatable)
    #[arg(long = "header", short = 'H')]
    pub headers: Vec<String>,

    #[arg(long, short = 'd')]
    pub body: Option<String>,

    /// How long the request stays valid
    #[arg(long, default_value = "24h")]
    pub expiry: String,

    /// Block until answered, giving up after this long
    #[arg(long)]
    pub wait: Option<String>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for SendRequest {
    type Error = RpcOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (state, endpoint) = endpoint(ctx)?;

        let url: SyftUrl = self.url.parse()?;
        let method: SyftMethod = self.method.parse()?;
        let expiry = common::rpc::parse_duration(&self.expiry)?;

        let mut request = SyftRequest::new(endpoint.identity(), url, method).with_expiry(expiry);
        for header in &self.headers {
            let (name, value) = parse_header(header)?;
            request = request.with_header(&name, &value);
        }
        if let Some(body) = &self.body {
            request = request.with_body(body.as_bytes());
        }

        let future = endpoint.send(&request)?;
        let store = state.future_store();
        store.save(&future)?;

        let Some(wait) = &self.wait else {
            return Ok(future.id.to_string());
        };

        let mut future = future;
        let response =
            await_stored(&store, &mut future, std_duration(wait)?, DEFAULT_POLL_INTERVAL).await?;
        Ok(format!("{} {}", response.status_code, response.text()))
    }
}
