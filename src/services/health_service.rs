use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Respond with a static health payload while logging archive connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_archive().await {
        Ok(archive) => {
            if let Err(err) = archive.health_check().await {
                warn!(error = %err, "archive health check failed");
            }
        }
        Err(_) => warn!("archive unavailable (degraded mode)"),
    }

    if state.is_degraded() {
        HealthResponse::degraded()
    } else {
        HealthResponse::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::test_state;

    #[tokio::test]
    async fn reports_degraded_without_archive() {
        let (state, _) = test_state().await;
        assert_eq!(health_status(&state).await, HealthResponse::ok());

        state.clear_archive().await;
        assert_eq!(health_status(&state).await, HealthResponse::degraded());
    }
}
