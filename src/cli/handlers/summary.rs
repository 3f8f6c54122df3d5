//! Summary command handler
//!
//! Prints the spending summary of one user, acting as that user.

use tokio_util::sync::CancellationToken;

use crate::cli::parser::SummaryArgs;
use crate::config::Settings;
use crate::context::{Authentication, ConnectedAccount, RequestContext};
use crate::error::{AppError, AppResult};
use crate::handlers::{QueryHandler, SummaryRequest};
use crate::models::{Role, UserId};
use crate::state::AppState;

/// Handler for the summary command
pub struct SummaryCommandHandler {
    config: Settings,
}

impl SummaryCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    /// Connects to the database and prints the summary as pretty JSON.
    /// Ctrl-C cancels the request.
    ///
    /// # Errors
    /// - Database connection errors
    /// - `AppError::Canceled` when interrupted
    pub async fn execute(&self, args: &SummaryArgs) -> AppResult<()> {
        let state = AppState::connect(self.config.clone()).await?;

        let cancellation = CancellationToken::new();
        let interrupt = cancellation.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.cancel();
            }
        });

        let output = summarize(&state, args, cancellation).await?;
        println!("{output}");
        Ok(())
    }
}

/// Principal for `args.user`: its stored account when there is one, a plain
/// user on `--plan` (or the default plan) otherwise.
async fn principal(state: &AppState, args: &SummaryArgs) -> AppResult<ConnectedAccount> {
    let user = UserId::new(args.user.as_str());
    let principal = match state.repositories.accounts.get_by_id(&user).await? {
        Some(account) => ConnectedAccount::new(account.user_id, account.plan_id, account.role)
            .with_family(account.family_id),
        None => {
            let plan = args
                .plan
                .clone()
                .unwrap_or_else(|| state.settings.plans.default_plan.clone());
            ConnectedAccount::new(user, plan, Role::User)
        }
    };
    Ok(principal)
}

async fn summarize(
    state: &AppState,
    args: &SummaryArgs,
    cancellation: CancellationToken,
) -> AppResult<String> {
    let ctx = RequestContext::with_cancellation(principal(state, args).await?, cancellation);
    let request = SummaryRequest {
        query: args.to_query(),
        currency: args.currency.clone(),
    };
    let summary = state.handlers.accounts.query(&ctx, request).await?;
    tracing::debug!(user_id = %ctx.must_get_connected_account().user_id(), "Summary computed");

    serde_json::to_string_pretty(&summary).map_err(|e| AppError::Internal {
        source: anyhow::Error::from(e),
    })
}
