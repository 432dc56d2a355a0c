use tracing::info;

use crate::{
    conversions::trigger::{CdcRequest, SnsEvent},
    pipeline::{
        data_pipeline::{DataPipeline, RunSummary},
        destinations::StreamWriter,
        dispatcher::Dispatcher,
        sources::Connector,
        PipelineError,
    },
};

/// Handles every notification in `event` in order, stopping at the first
/// failure. Each notification gets its own database connection.
pub async fn handle_event<C: Connector, W: StreamWriter>(
    event: &SnsEvent,
    dispatcher: &mut Dispatcher<W>,
    connector: &C,
) -> Result<RunSummary, PipelineError> {
    let mut summary = RunSummary::default();

    for record in &event.records {
        let request = CdcRequest::try_from(&record.sns)?;
        info!(
            "handling {} for {}.{}",
            record.sns.subject.as_deref().unwrap_or("notification"),
            request.database,
            request.table
        );

        let source = connector.connect(&request).await?;
        let pipeline = DataPipeline::new(source, dispatcher, request.batch_config());

        summary += pipeline.run(&request.query()).await?;
    }

    Ok(summary)
}
