use std::sync::Arc;
use std::time::Duration;

use agenda_config::Config;
use agenda_contracts::{Message, NotificationLog};
use agenda_kernel::{local_offset, ReminderWindow};
use chrono::{DateTime, FixedOffset, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::delivery::{DeliveryGateway, Destination};
use crate::error::StoreError;
use crate::render;
use crate::store::{EventQuery, RecordStore};

/// Daily reminder pushes for upcoming events, at most one logged send per
/// event. Must run in a single process only; the log lookup is not a lock.
pub struct NotificationScheduler {
    store: Arc<dyn RecordStore>,
    gateway: Arc<DeliveryGateway>,
    window: ReminderWindow,
    offset: FixedOffset,
}

impl NotificationScheduler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        gateway: Arc<DeliveryGateway>,
        window: ReminderWindow,
        offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            gateway,
            window,
            offset,
        }
    }

    pub fn from_config(
        cfg: &Config,
        store: Arc<dyn RecordStore>,
        gateway: Arc<DeliveryGateway>,
    ) -> Self {
        let window = ReminderWindow::new(
            cfg.scheduler.reminder_hour,
            cfg.scheduler.lead_minutes,
            cfg.scheduler.tolerance_minutes,
        );
        Self::new(store, gateway, window, local_offset(cfg.bot.utc_offset_minutes))
    }

    /// One pass over events dated `now` or later. Returns how many reminders
    /// were delivered.
    pub async fn scan_once(&self, now: DateTime<FixedOffset>) -> Result<usize, StoreError> {
        let today = now.date_naive();
        let events = self
            .store
            .list_events(EventQuery::default().from_date(today))
            .await?;

        let mut delivered = 0;
        for event in events.iter().filter(|e| self.window.is_due(e.date, now)) {
            if self.store.notification_sent(event.id).await? {
                continue;
            }
            let text = render::reminder(event);
            let sent = self
                .gateway
                .send_exact(
                    &Destination::Push(event.owner.clone()),
                    vec![Message::text(text.clone())],
                )
                .await;
            let log = NotificationLog {
                event_id: event.id,
                user_id: event.owner.clone(),
                sent_at: now,
                message: text,
                sent,
            };
            if let Err(e) = self.store.insert_notification(log).await {
                error!(event_id = event.id, error = %e, "Failed to record reminder");
            }
            if sent {
                info!(event_id = event.id, owner = %event.owner, "Reminder sent");
                delivered += 1;
            } else {
                warn!(event_id = event.id, "Reminder not delivered");
            }
        }
        Ok(delivered)
    }

    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = Utc::now().with_timezone(&self.offset);
                match self.scan_once(now).await {
                    Ok(0) => {}
                    Ok(sent) => info!(sent, "Reminder scan complete"),
                    Err(e) => error!(error = %e, "Reminder scan failed"),
                }
            }
        })
    }
}
