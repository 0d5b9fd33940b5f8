// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Notification Application Service
//!
//! Persists notifications through the NotificationRepository and pushes them
//! to the owning team's channel on the event bus.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::domain::notification::{Notification, NotificationError, NotificationSink};
use crate::domain::repository::NotificationRepository;
use crate::domain::tool::TeamId;
use crate::infrastructure::event_bus::EventBus;

pub struct NotificationService {
    repository: Arc<dyn NotificationRepository>,
    event_bus: Arc<EventBus>,
}

impl NotificationService {
    pub fn new(repository: Arc<dyn NotificationRepository>, event_bus: Arc<EventBus>) -> Self {
        Self {
            repository,
            event_bus,
        }
    }

    /// A team's most recent notifications, newest first
    pub async fn recent(&self, team_id: &TeamId, limit: usize) -> Result<Vec<Notification>, NotificationError> {
        Ok(self.repository.find_by_team(team_id, limit).await?)
    }
}

#[async_trait]
impl NotificationSink for NotificationService {
    async fn create(&self, notification: &Notification) -> Result<(), NotificationError> {
        self.repository.create(notification).await?;
        Ok(())
    }

    async fn broadcast(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), NotificationError> {
        let receivers = self.event_bus.publish_to_channel(channel, event, payload);
        debug!(channel, event, receivers, "broadcast notification");
        Ok(())
    }
}
