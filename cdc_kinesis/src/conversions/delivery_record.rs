use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;

use super::row::Row;

/// Partition keys are drawn uniformly from `pk-00001..=pk-01024`.
pub const PARTITION_KEY_SPACE: u32 = 1024;

/// A row ready to be written to the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeliveryRecord {
    pub data: String,
    pub partition_key: String,
}

/// One batch as a single `PutRecords` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutRecordsRequest {
    pub stream_name: String,
    pub records: Vec<DeliveryRecord>,
}

#[derive(Debug, Clone)]
pub struct PartitionKeys {
    rng: StdRng,
}

impl PartitionKeys {
    /// Seeded from OS entropy unless a seed is given.
    pub fn new(seed: Option<u64>) -> PartitionKeys {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        PartitionKeys { rng }
    }

    pub fn next_key(&mut self) -> String {
        format!("pk-{:05}", self.rng.random_range(1..=PARTITION_KEY_SPACE))
    }
}

impl Default for PartitionKeys {
    fn default() -> Self {
        Self::new(None)
    }
}

impl DeliveryRecord {
    pub fn from_row(row: &Row, keys: &mut PartitionKeys) -> Result<Self, serde_json::Error> {
        Ok(DeliveryRecord {
            data: serde_json::to_string(row)?,
            partition_key: keys.next_key(),
        })
    }
}

impl PutRecordsRequest {
    pub fn from_rows(
        stream_name: &str,
        rows: &[Row],
        keys: &mut PartitionKeys,
    ) -> Result<Self, serde_json::Error> {
        let records = rows
            .iter()
            .map(|row| DeliveryRecord::from_row(row, keys))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PutRecordsRequest {
            stream_name: stream_name.to_string(),
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn pet() -> Row {
        let mut row = Row::new();
        row.insert("name".to_string(), json!("Bowser"));
        row.insert("owner".to_string(), json!("Diane"));
        row.insert("species".to_string(), json!("dog"));
        row.insert("weight".to_string(), json!(12.5));
        row.insert("death".to_string(), json!(null));
        row
    }

    #[test]
    fn partition_keys_are_padded_and_in_range() {
        let mut keys = PartitionKeys::default();
        for _ in 0..2000 {
            let key = keys.next_key();
            assert_eq!(key.len(), 8);
            let n: u32 = key.strip_prefix("pk-").unwrap().parse().unwrap();
            assert!((1..=PARTITION_KEY_SPACE).contains(&n), "{key}");
        }
    }

    #[test]
    fn seeded_keys_repeat() {
        let mut a = PartitionKeys::new(Some(47));
        let mut b = PartitionKeys::new(Some(47));
        let a: Vec<String> = (0..16).map(|_| a.next_key()).collect();
        let b: Vec<String> = (0..16).map(|_| b.next_key()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn payload_is_row_json_in_column_order() {
        let mut keys = PartitionKeys::new(Some(1));
        let record = DeliveryRecord::from_row(&pet(), &mut keys).unwrap();
        assert_eq!(
            record.data,
            r#"{"name":"Bowser","owner":"Diane","species":"dog","weight":12.5,"death":null}"#
        );
    }

    #[test]
    fn payload_keeps_non_ascii_text() {
        let mut row = Row::new();
        row.insert("name".to_string(), json!("고양이"));
        let record = DeliveryRecord::from_row(&row, &mut PartitionKeys::default()).unwrap();
        assert_eq!(record.data, r#"{"name":"고양이"}"#);
    }

    #[test]
    fn request_serializes_like_put_records() {
        let mut keys = PartitionKeys::new(Some(7));
        let request = PutRecordsRequest::from_rows("cdc-from-mysql", &[pet(), pet()], &mut keys)
            .unwrap();
        assert_eq!(request.records.len(), 2);

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["StreamName"], "cdc-from-mysql");
        assert!(value["Records"][0]["Data"].is_string());
        assert!(value["Records"][1]["PartitionKey"]
            .as_str()
            .unwrap()
            .starts_with("pk-"));
    }
}
