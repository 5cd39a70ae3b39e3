use clap::Args;
use uuid::Uuid;

use common::rpc::{SyftStatus, SyftUrl};

use super::{endpoint, RpcOpError};

/// Answer or refuse a pending request.
#[derive(Args, Debug, Clone)]
pub struct Reply {
    /// Endpoint url the request was sent to
    pub url: String,

    /// Id of the pending request
    pub id: Uuid,

    #[arg(long, default_value_t = 200)]
    pub status: u16,

    #[arg(long, short = 'd')]
    pub body: Option<String>,

    /// Drop a rejection marker instead of answering
    #[arg(long, conflicts_with_all = ["status", "body"])]
    pub reject: bool,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Reply {
    type Error = RpcOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, endpoint) = endpoint(ctx)?;
        let url: SyftUrl = self.url.parse()?;

        let request = endpoint
            .pending_requests(&url)?
            .into_iter()
            .find(|request| request.id == self.id)
            .ok_or_else(|| {
                RpcOpError::InvalidArgument(format!("no pending request {} at {}", self.id, url))
            })?;

        if self.reject {
            endpoint.reject(&request)?;
            return Ok(format!("rejected {}", request.id));
        }

        let status = SyftStatus::try_from(self.status)?;
        let body = self.body.as_ref().map(|body| body.as_bytes().to_vec());
        let response = endpoint.reply_to(&request, status, body)?;
        Ok(format!("answered {} with {}", response.id, response.status_code))
    }
}
