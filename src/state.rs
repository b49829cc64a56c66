use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::auth::IdentityResolver;
use crate::config::Config;
use crate::db::{ActivityLog, SubmissionStore};
use crate::provider::AnalysisProvider;
use crate::services::PollSchedule;
use crate::storage::LocalStorage;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SubmissionStore>,
    pub activities: Arc<dyn ActivityLog>,
    pub provider: Arc<dyn AnalysisProvider>,
    pub identity: Arc<dyn IdentityResolver>,
    pub storage: LocalStorage,
    pub config: Arc<Config>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn poll_schedule(&self) -> PollSchedule {
        PollSchedule {
            interval: self.config.poll_interval,
            max_attempts: self.config.poll_max_attempts,
        }
    }
}
