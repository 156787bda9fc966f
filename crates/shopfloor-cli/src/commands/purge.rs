use anyhow::Context;
use clap::Args;
use jiff::Timestamp;
use shopfloor_postgres::PgClient;
use shopfloor_postgres::prelude::*;
use shopfloor_postgres::query::{InviteWhere, SessionWhere};
use shopfloor_postgres::types::DateTimeFilter;

use crate::TRACING_TARGET_COMMAND;

/// Options of `shopfloor purge`.
#[derive(Debug, Clone, Args)]
pub struct PurgeArgs {
    /// Count expired rows without deleting them
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(client: &PgClient, args: &PurgeArgs) -> anyhow::Result<()> {
    let (sessions, invites) = if args.dry_run {
        count_expired(client).await?
    } else {
        client
            .transaction(|conn| {
                async move {
                    let sessions = conn.delete_expired_sessions().await?;
                    let invites = conn.delete_expired_invites().await?;
                    Ok((sessions, invites))
                }
                .scope_boxed()
            })
            .await
            .context("failed to purge expired rows")?
    };

    let verb = if args.dry_run { "would delete" } else { "deleted" };
    println!("{verb} {sessions} expired sessions and {invites} expired invites");

    tracing::info!(
        target: TRACING_TARGET_COMMAND,
        dry_run = args.dry_run,
        sessions,
        invites,
        "Purge finished"
    );
    Ok(())
}

async fn count_expired(client: &PgClient) -> anyhow::Result<(usize, usize)> {
    let now = Timestamp::now();
    let mut conn = client.get_connection().await?;

    let sessions = conn
        .session()
        .count(FindManyArgs::new().filter(SessionWhere::ExpiresAt(DateTimeFilter::Lte(now))))
        .await
        .context("failed to count expired sessions")?;
    let invites = conn
        .invite()
        .count(FindManyArgs::new().filter(InviteWhere::ExpiresAt(DateTimeFilter::Lte(now))))
        .await
        .context("failed to count expired invites")?;

    Ok((usize::try_from(sessions)?, usize::try_from(invites)?))
}
