//! Consumes [`crate::model::MessageOutbox`] rows after a message commits:
//! bumps unread counters, fans out targeted notifications, and POSTs bot
//! webhooks. A pool of workers drains the pending queue on a short poll
//! interval; a separate scanner reclaims rows stuck past a grace period,
//! covering a worker that crashed mid-delivery.

mod notify;
mod webhook;

use crate::model::MessageOutbox;
use crate::state::Hub;
use std::time::Duration;
use webhook::WebhookClient;

const CLAIM_BATCH_SIZE: u32 = 32;

pub async fn run_worker_pool(hub: Hub) {
    let worker_count = hub.config.outbox.worker_count;
    let mut handles = Vec::with_capacity(worker_count);
    for id in 0..worker_count {
        let hub = hub.clone();
        handles.push(tokio::spawn(async move { run_worker(hub, id).await }));
    }
    for handle in handles {
        let _ = handle.await;
    }
}

async fn run_worker(hub: Hub, worker_id: usize) {
    let webhook_client = WebhookClient::new(Duration::from_secs(hub.config.webhook.timeout_secs));
    let mut interval = tokio::time::interval(Duration::from_millis(hub.config.outbox.poll_interval_ms));

    loop {
        interval.tick().await;
        let rows = match hub.db.outbox().claim_pending(CLAIM_BATCH_SIZE).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, worker_id, "failed to claim pending outbox rows");
                continue;
            }
        };

        for row in rows {
            process_row(&hub, &webhook_client, row).await;
        }
    }
}

/// Background scanner: reclaims rows still `pending` past the configured
/// grace period. Under normal operation the worker pool drains rows within
/// one poll interval, so this only fires after a crash or a stalled worker.
pub async fn run_stuck_scanner(hub: Hub) {
    let webhook_client = WebhookClient::new(Duration::from_secs(hub.config.webhook.timeout_secs));
    let mut interval = tokio::time::interval(Duration::from_secs(hub.config.outbox.retry_grace_secs as u64));

    loop {
        interval.tick().await;
        let rows = match hub
            .db
            .outbox()
            .stuck_pending(hub.config.outbox.retry_grace_secs, CLAIM_BATCH_SIZE)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "failed to scan stuck outbox rows");
                continue;
            }
        };

        if !rows.is_empty() {
            tracing::warn!(count = rows.len(), "reprocessing stuck outbox rows");
            crate::metrics::OUTBOX_STUCK_RECLAIMED.inc_by(rows.len() as u64);
        }

        match hub.db.outbox().count_pending().await {
            Ok(count) => crate::metrics::OUTBOX_PENDING.set(count),
            Err(e) => tracing::warn!(error = %e, "failed to refresh outbox backlog gauge"),
        }

        for row in rows {
            process_row(&hub, &webhook_client, row).await;
        }
    }
}

async fn process_row(hub: &Hub, webhook_client: &WebhookClient, row: MessageOutbox) {
    let envelope = &row.payload.envelope;

    let already_observed = row
        .last_observed_seq_id
        .is_some_and(|observed| observed >= envelope.seq_id);

    if !already_observed {
        if let Err(e) = hub
            .db
            .read_status()
            .increment_unread_for_channel(&row.channel_id, &envelope.sender_id)
            .await
        {
            tracing::error!(error = %e, message_id = %row.message_id, "failed to increment unread counts");
            return;
        }
        if let Err(e) = hub.db.outbox().set_last_observed_seq_id(row.message_id, envelope.seq_id).await {
            tracing::warn!(error = %e, message_id = %row.message_id, "failed to record last_observed_seq_id");
        }
    }

    match hub.db.channels().find(&row.channel_id).await {
        Ok(Some(channel)) => notify::dispatch(hub, &channel, envelope, &row.payload.mentions).await,
        Ok(None) => tracing::warn!(channel_id = %row.channel_id, "channel missing for outbox row"),
        Err(e) => tracing::warn!(error = %e, channel_id = %row.channel_id, "failed to load channel for notification dispatch"),
    }

    match hub.db.users().active_bots_with_webhook(&row.channel_id, &envelope.sender_id).await {
        Ok(bots) => {
            for bot in bots {
                if let Err(e) = webhook_client.deliver(&bot, envelope).await {
                    tracing::warn!(error = %e, bot_id = %bot.id, "bot webhook delivery failed");
                    crate::metrics::WEBHOOK_FAILURES.inc();
                }
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to load webhook-bearing bots"),
    }

    if let Err(e) = hub.db.outbox().mark_completed(row.message_id).await {
        tracing::error!(error = %e, message_id = %row.message_id, "failed to mark outbox row completed");
    }
}
