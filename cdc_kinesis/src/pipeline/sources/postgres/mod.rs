use async_trait::async_trait;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, Config, NoTls};
use tracing::{error, info};

use crate::conversions::{
    row::{JsonConverter, Row},
    trigger::CdcRequest,
};

use super::{Connector, RowStream, Source, SourceError};

pub struct PostgresSource {
    client: Option<Client>,
    connection: Option<JoinHandle<Result<(), tokio_postgres::Error>>>,
}

impl PostgresSource {
    pub async fn connect(config: &Config) -> Result<PostgresSource, SourceError> {
        let (client, connection) = config.connect(NoTls).await?;

        let connection = tokio::spawn(async move {
            let res = connection.await;
            if let Err(e) = &res {
                error!("postgres connection error: {e}");
            }
            res
        });

        Ok(PostgresSource {
            client: Some(client),
            connection: Some(connection),
        })
    }

    pub fn config_for(request: &CdcRequest) -> Config {
        let mut config = Config::new();
        config
            .host(request.db_host.as_str())
            .port(request.db_port)
            .user(request.db_user.as_str())
            .password(&request.db_password)
            .dbname(request.database.as_str());
        config
    }
}

#[async_trait]
impl Source for PostgresSource {
    async fn query_rows<'a>(&'a self, query: &str) -> Result<RowStream<'a>, SourceError> {
        let client = self.client.as_ref().ok_or(SourceError::Closed)?;

        let params: Vec<String> = Vec::new();
        let rows = client.query_raw(query, params).await?;

        Ok(rows
            .map(|row| -> Result<Row, SourceError> { Ok(JsonConverter::from_row(&row?)?) })
            .boxed())
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        // The connection task finishes once the last client handle is gone.
        drop(self.client.take());

        if let Some(connection) = self.connection.take() {
            match connection.await {
                Ok(res) => res?,
                Err(e) => error!("postgres connection task failed: {e}"),
            }
            info!("closed postgres connection");
        }

        Ok(())
    }
}

pub struct PostgresConnector;

#[async_trait]
impl Connector for PostgresConnector {
    type Source = PostgresSource;

    async fn connect(&self, request: &CdcRequest) -> Result<PostgresSource, SourceError> {
        info!(
            "connecting to {}:{}/{} as {}",
            request.db_host, request.db_port, request.database, request.db_user
        );
        PostgresSource::connect(&PostgresSource::config_for(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_targets_request_database() {
        let request: CdcRequest = r#"{
            "db_host": "db.internal",
            "db_port": 6543,
            "db_user": "loader",
            "db_password": "secret",
            "database": "shop",
            "table": "orders",
            "columns": "*",
            "where_clause": "true"
        }"#
        .parse()
        .unwrap();

        let config = PostgresSource::config_for(&request);

        assert_eq!(config.get_ports(), [6543]);
        assert_eq!(config.get_user(), Some("loader"));
        assert_eq!(config.get_dbname(), Some("shop"));
        assert_eq!(config.get_password(), Some(&b"secret"[..]));
    }

    #[tokio::test]
    async fn closed_source_rejects_queries() {
        let mut source = PostgresSource {
            client: None,
            connection: None,
        };
        source.close().await.unwrap();
        assert!(matches!(
            source.query_rows("SELECT 1").await,
            Err(SourceError::Closed)
        ));
    }
}
