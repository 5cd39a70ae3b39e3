use clap::Args;

use common::rpc::SyftUrl;

use super::{endpoint, RpcOpError};

/// List unanswered requests addressed to one of our endpoints.
#[derive(Args, Debug, Clone)]
pub struct Pending {
    /// Endpoint url inside our own datasite
    pub url: String,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Pending {
    type Error = RpcOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, endpoint) = endpoint(ctx)?;
        let url: SyftUrl = self.url.parse()?;

        let requests = endpoint.pending_requests(&url)?;
        if requests.is_empty() {
            return Ok("no pending requests".to_string());
        }
        let lines: Vec<String> = requests
            .iter()
            .map(|request| {
                format!(
                    "{} {} from {} ({} bytes)",
                    request.id,
                    request.method,
                    request.sender,
                    request.body.as_ref().map_or(0, Vec::len)
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }
}
