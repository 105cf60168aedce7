//! Study schedule types

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::UserId;

/// One planned study task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleTask {
    pub id: Uuid,
    pub user_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub scheduled_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub duration_minutes: i32,
    pub completed: bool,
}
