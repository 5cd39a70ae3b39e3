use clap::Args;
use uuid::Uuid;

use common::rpc::DEFAULT_POLL_INTERVAL;

use super::{await_stored, endpoint, std_duration, RpcOpError};

/// Wait for the answer to a request sent earlier.
#[derive(Args, Debug, Clone)]
pub struct Wait {
    /// Id printed by `syncbox rpc send`
    pub id: Uuid,

    /// Give up after this long
    #[arg(long, default_value = "1m")]
    pub timeout: String,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Wait {
    type Error = RpcOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (state, _) = endpoint(ctx)?;
        let store = state.future_store();
        let mut future = store.load(&self.id)?;

        let response = await_stored(
            &store,
            &mut future,
            std_duration(&self.timeout)?,
            DEFAULT_POLL_INTERVAL,
        )
        .await?;
        Ok(format!("{} {}", response.status_code, response.text()))
    }
}
