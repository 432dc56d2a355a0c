use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::batching::BatchConfig;

/// Upper bound of a single Kinesis `PutRecords` call.
pub const MAX_PUT_RECORDS: usize = 500;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("invalid sns event: {0}")]
    InvalidEvent(#[source] serde_json::Error),

    #[error("invalid cdc request message: {0}")]
    InvalidMessage(#[source] serde_json::Error),

    #[error("kinesis_max_put_records must be between 1 and 500, got {0}")]
    InvalidBatchSize(usize),
}

/// Notification envelope as delivered by SNS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnsEvent {
    #[serde(rename = "Records")]
    pub records: Vec<SnsEventRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnsEventRecord {
    #[serde(rename = "EventSource", default, skip_serializing_if = "Option::is_none")]
    pub event_source: Option<String>,

    #[serde(rename = "Sns")]
    pub sns: SnsMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SnsMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// JSON encoded [`CdcRequest`].
    pub message: String,
}

impl SnsEvent {
    /// An event carrying a single notification.
    pub fn single(subject: impl Into<String>, message: impl Into<String>) -> SnsEvent {
        SnsEvent {
            records: vec![SnsEventRecord {
                event_source: Some("aws:sns".to_string()),
                sns: SnsMessage {
                    message_id: None,
                    subject: Some(subject.into()),
                    message: message.into(),
                },
            }],
        }
    }
}

impl FromStr for SnsEvent {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s).map_err(TriggerError::InvalidEvent)
    }
}

/// What to read and where from, as carried in a notification message.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdcRequest {
    pub db_host: String,
    #[serde(default = "default_db_port")]
    pub db_port: u16,
    pub db_user: String,
    pub db_password: String,
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub table: String,
    pub columns: String,
    pub where_clause: String,
    #[serde(default = "default_max_put_records")]
    pub kinesis_max_put_records: usize,
}

fn default_db_port() -> u16 {
    5432
}

fn default_max_put_records() -> usize {
    BatchConfig::DEFAULT_MAX_BATCH_SIZE
}

impl CdcRequest {
    pub fn query(&self) -> String {
        let table = match &self.schema {
            Some(schema) => format!("{schema}.{}", self.table),
            None => self.table.clone(),
        };
        format!(
            "SELECT {}\nFROM {table}\nWHERE {}\n",
            self.columns, self.where_clause
        )
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig::new(self.kinesis_max_put_records)
    }
}

impl FromStr for CdcRequest {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let request: CdcRequest = serde_json::from_str(s).map_err(TriggerError::InvalidMessage)?;
        if request.kinesis_max_put_records == 0 || request.kinesis_max_put_records > MAX_PUT_RECORDS
        {
            return Err(TriggerError::InvalidBatchSize(
                request.kinesis_max_put_records,
            ));
        }
        Ok(request)
    }
}

impl TryFrom<&SnsMessage> for CdcRequest {
    type Error = TriggerError;

    fn try_from(message: &SnsMessage) -> Result<CdcRequest, TriggerError> {
        message.message.parse()
    }
}

impl fmt::Debug for CdcRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdcRequest")
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_user", &self.db_user)
            .field("db_password", &"<redacted>")
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("table", &self.table)
            .field("columns", &self.columns)
            .field("where_clause", &self.where_clause)
            .field("kinesis_max_put_records", &self.kinesis_max_put_records)
            .finish()
    }
}
