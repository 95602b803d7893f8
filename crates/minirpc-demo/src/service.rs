//! Demo user service shared by `minirpc serve` and `minirpc call`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use minirpc_protocol::{CallContext, HandlerError, rpc_service};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetByIdReq {
    pub id: u64,
    /// Extra time the server spends before answering.
    #[serde(default)]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetByIdResp {
    pub user: User,
}

rpc_service! {
    pub service UserService("user-service") => UserServiceClient, UserServiceHandler {
        rpc get_by_id(GetByIdReq) -> GetByIdResp;
    }
}

/// In-memory implementation: every non-zero id exists.
#[derive(Debug, Default)]
pub struct UserDirectory;

impl UserServiceHandler for UserDirectory {
    async fn get_by_id(
        &self,
        ctx: CallContext,
        req: GetByIdReq,
    ) -> Result<GetByIdResp, HandlerError> {
        debug!(id = req.id, remaining = ?ctx.remaining(), oneway = ctx.is_oneway(), "get_by_id");
        if req.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(req.delay_ms)).await;
        }
        if ctx.is_expired() {
            info!(id = req.id, "Caller deadline passed while handling get_by_id");
        }
        if req.id == 0 {
            return Err("user 0 does not exist".into());
        }
        Ok(GetByIdResp {
            user: User {
                id: req.id,
                name: format!("user-{}", req.id),
            },
        })
    }
}
