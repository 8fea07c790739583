//! Liveness and readiness handlers.
//!
//! | Check | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Does the store answer? Failure → pulled from load-balancer. |

use http::StatusCode;
use tracing::warn;

use crate::request::Request;
use crate::response::Response;
use crate::store::Database;

/// Always `200 ok`. Has no dependencies.
pub async fn liveness(_req: Request) -> Response {
    Response::text("ok")
}

/// `200 ready` when the store answers a ping, `503` otherwise.
pub async fn readiness(db: Database, req: Request) -> Response {
    match db.ping().await {
        Ok(()) => Response::text("ready"),
        Err(e) => {
            warn!(correlation_id = %req.context().correlation_id(), "store not ready: {e}");
            Response::status(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
