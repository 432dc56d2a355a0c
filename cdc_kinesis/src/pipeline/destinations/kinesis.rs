use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_kinesis::{
    error::DisplayErrorContext, primitives::Blob, types::PutRecordsRequestEntry, Client,
};
use tracing::info;

use crate::conversions::delivery_record::PutRecordsRequest;

use super::{PutRecordsResponse, StreamWriter, StreamWriterError};

pub struct KinesisWriter {
    client: Client,
}

impl KinesisWriter {
    pub fn new(client: Client) -> KinesisWriter {
        KinesisWriter { client }
    }

    /// Client for `region` using the default credential chain.
    pub async fn from_region(region: &str) -> KinesisWriter {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self::new(Client::new(&config))
    }
}

fn request_entries(
    request: &PutRecordsRequest,
) -> Result<Vec<PutRecordsRequestEntry>, StreamWriterError> {
    Ok(request
        .records
        .iter()
        .map(|record| {
            PutRecordsRequestEntry::builder()
                .data(Blob::new(record.data.as_bytes()))
                .partition_key(record.partition_key.as_str())
                .build()
        })
        .collect::<Result<Vec<_>, _>>()?)
}

// The service reports an optional signed count.
fn failed_record_count(reported: Option<i32>) -> usize {
    reported.unwrap_or(0).max(0) as usize
}

#[async_trait]
impl StreamWriter for KinesisWriter {
    async fn put_records(
        &self,
        request: &PutRecordsRequest,
    ) -> Result<PutRecordsResponse, StreamWriterError> {
        let entries = request_entries(request)?;

        let output = self
            .client
            .put_records()
            .stream_name(request.stream_name.as_str())
            .set_records(Some(entries))
            .send()
            .await
            .map_err(|e| StreamWriterError::Kinesis(DisplayErrorContext(e).to_string()))?;

        let failed_record_count = failed_record_count(output.failed_record_count());
        info!(
            "put_records into {}: {} records, {} failed",
            request.stream_name,
            output.records().len(),
            failed_record_count
        );

        Ok(PutRecordsResponse {
            failed_record_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::conversions::delivery_record::DeliveryRecord;

    use super::*;

    fn request() -> PutRecordsRequest {
        PutRecordsRequest {
            stream_name: "cdc-from-mysql".to_string(),
            records: vec![
                DeliveryRecord {
                    data: r#"{"name":"Fluffy"}"#.to_string(),
                    partition_key: "pk-00007".to_string(),
                },
                DeliveryRecord {
                    data: r#"{"name":"Claws"}"#.to_string(),
                    partition_key: "pk-01024".to_string(),
                },
            ],
        }
    }

    #[test]
    fn entries_carry_data_and_partition_key() {
        let entries = request_entries(&request()).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].data().as_ref(), br#"{"name":"Fluffy"}"#);
        assert_eq!(entries[0].partition_key(), "pk-00007");
        assert_eq!(entries[1].data().as_ref(), br#"{"name":"Claws"}"#);
        assert_eq!(entries[1].partition_key(), "pk-01024");
        assert_eq!(entries[1].explicit_hash_key(), None);
    }

    #[test]
    fn empty_request_has_no_entries() {
        let request = PutRecordsRequest {
            records: Vec::new(),
            ..request()
        };
        assert!(request_entries(&request).unwrap().is_empty());
    }

    #[test]
    fn failed_record_count_is_clamped() {
        assert_eq!(failed_record_count(None), 0);
        assert_eq!(failed_record_count(Some(-1)), 0);
        assert_eq!(failed_record_count(Some(3)), 3);
    }
}
