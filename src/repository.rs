use crate::client::LedgerClient;
use crate::codec::{self, Decoded, EventPayload};
use crate::error::{Result, SdkError};
use crate::index::ParticipationIndex;
use crate::policy;
use crate::profile::UserProfile;
use crate::transport::LedgerTransport;
use crate::types::{require_uint, Batch, EventType, LedgerLog, Role, SupplyChainEvent, TxReceipt};
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::pin::pin;

/// Events of one batch in timeline order, plus indices that could not be read
#[derive(Debug, Clone, PartialEq)]
pub struct BatchHistory {
    pub batch_id: u64,
    pub events: Vec<SupplyChainEvent>,
    pub skipped: Vec<u64>,
}

impl BatchHistory {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// An event with its decoded payload
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub event: SupplyChainEvent,
    pub decoded: Decoded,
}

/// Outcome of creating a batch together with its harvest event
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCreation {
    pub batch_id: u64,
    /// Set when the batch exists but the harvest event could not be written
    pub harvest_error: Option<String>,
}

/// Batch and event operations on top of a [`LedgerClient`]
pub struct BatchRepository<T: LedgerTransport> {
    client: LedgerClient<T>,
    index: Option<ParticipationIndex>,
}

impl<T: LedgerTransport> BatchRepository<T> {
    pub fn new(client: LedgerClient<T>) -> Self {
        Self {
            client,
            index: None,
        }
    }

    /// Keep `index` up to date with this repository's writes
    pub fn with_index(mut self, index: ParticipationIndex) -> Self {
        self.index = Some(index);
        self
    }

    pub fn client(&self) -> &LedgerClient<T> {
        &self.client
    }

    pub fn index(&self) -> Option<&ParticipationIndex> {
        self.index.as_ref()
    }

    pub async fn connect(&mut self) -> Result<String> {
        self.client.connect().await
    }

    pub fn disconnect(&mut self) {
        self.client.disconnect();
    }

    fn contract(&self) -> &str {
        &self.client.config().contract_address
    }

    fn concurrency(&self) -> usize {
        self.client.config().read_concurrency.max(1)
    }

    async fn observe(&self, receipt: &TxReceipt) {
        if let Some(index) = &self.index {
            index.ingest_receipt(receipt, self.contract()).await;
        }
    }

    // ========== Writes ==========

    /// Create a batch and return the id the ledger assigned to it.
    pub async fn create_batch(&self, product_type: &str) -> Result<u64> {
        let receipt = self
            .client
            .submit("createBatch", vec![json!(product_type)])
            .await?;
        self.observe(&receipt).await;

        let batch_id = self.resolve_batch_id(&receipt).await?;
        tracing::info!(batch_id, product_type, tx_hash = %receipt.tx_hash, "batch created");
        Ok(batch_id)
    }

    /// Prefer the id in the `BatchCreated` log, else infer it from the counter.
    async fn resolve_batch_id(&self, receipt: &TxReceipt) -> Result<u64> {
        let logged = receipt
            .ledger_logs(self.contract())
            .into_iter()
            .find_map(|log| match log {
                LedgerLog::BatchCreated { batch_id, .. } if batch_id > 0 => Some(batch_id),
                _ => None,
            });
        if let Some(batch_id) = logged {
            return Ok(batch_id);
        }

        // Under concurrent creators the counter may already point past our batch.
        tracing::warn!(
            tx_hash = %receipt.tx_hash,
            "BatchCreated log missing or unreadable, inferring id from nextBatchId"
        );
        let next = self.next_batch_id().await.map_err(|e| {
            SdkError::BatchIdResolution(format!(
                "transaction {} confirmed but nextBatchId failed: {}",
                receipt.tx_hash, e
            ))
        })?;

        match next.checked_sub(1) {
            Some(batch_id) if batch_id > 0 => Ok(batch_id),
            _ => Err(SdkError::BatchIdResolution(format!(
                "transaction {} confirmed but nextBatchId is {}",
                receipt.tx_hash, next
            ))),
        }
    }

    /// Create a batch and record its harvest on behalf of `role`.
    ///
    /// A failed harvest write does not undo the batch; it is reported in
    /// [`BatchCreation::harvest_error`]. Only farmers may record a harvest.
    pub async fn create_batch_with_harvest(
        &self,
        product_type: &str,
        role: Role,
        harvest: EventPayload,
    ) -> Result<BatchCreation> {
        let batch_id = self.create_batch(product_type).await?;

        let harvest_error = match self
            .record_event(batch_id, EventType::Harvest, role, harvest)
            .await
        {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(batch_id, error = %e, "could not record harvest event");
                Some(e.to_string())
            }
        };

        Ok(BatchCreation {
            batch_id,
            harvest_error,
        })
    }

    /// Record an event against a batch on behalf of `role`.
    ///
    /// Kinds the role may not record are rejected before anything is sent.
    pub async fn record_event(
        &self,
        batch_id: u64,
        event_type: EventType,
        role: Role,
        mut payload: EventPayload,
    ) -> Result<()> {
        if !policy::may_record(role, event_type) {
            return Err(SdkError::EventNotPermitted { role, event_type });
        }
        if payload.role.is_none() {
            payload.role = Some(role);
        }

        let data_hash = codec::encode_for(event_type, &payload)?;
        let receipt = self
            .client
            .submit(
                "recordEvent",
                vec![json!(batch_id), json!(event_type.code()), json!(data_hash)],
            )
            .await?;
        self.observe(&receipt).await;

        tracing::info!(batch_id, event_type = %event_type, tx_hash = %receipt.tx_hash, "event recorded");
        Ok(())
    }

    /// Record an event as the holder of `profile`, stamping their name and role.
    pub async fn record_event_as(
        &self,
        profile: &UserProfile,
        batch_id: u64,
        event_type: EventType,
        payload: EventPayload,
    ) -> Result<()> {
        let payload = payload.recorded_by(profile.name.clone(), profile.role);
        self.record_event(batch_id, event_type, profile.role, payload)
            .await
    }

    // ========== Reads ==========

    pub async fn next_batch_id(&self) -> Result<u64> {
        let value = self.client.call("nextBatchId", vec![]).await?;
        require_uint(&value, "nextBatchId")
    }

    pub async fn get_batch(&self, batch_id: u64) -> Result<Batch> {
        if batch_id == 0 {
            return Err(SdkError::BatchNotFound(batch_id));
        }

        let value = self
            .client
            .call("getBatch", vec![json!(batch_id)])
            .await
            .map_err(|e| missing_or(e, batch_id))?;
        let batch = Batch::from_ledger(&value)?;

        // Unset storage reads back as id 0
        if batch.id != batch_id {
            return Err(SdkError::BatchNotFound(batch_id));
        }
        Ok(batch)
    }

    pub async fn history_count(&self, batch_id: u64) -> Result<u64> {
        let value = self
            .client
            .call("getBatchHistoryCount", vec![json!(batch_id)])
            .await
            .map_err(|e| missing_or(e, batch_id))?;
        require_uint(&value, "getBatchHistoryCount")
    }

    async fn read_event(&self, batch_id: u64, index: u64) -> Result<SupplyChainEvent> {
        let value = self
            .client
            .call("getBatchEvent", vec![json!(batch_id), json!(index)])
            .await;

        value
            .and_then(|v| SupplyChainEvent::from_ledger(index, &v))
            .map_err(|e| SdkError::EventRead {
                batch_id,
                index,
                reason: e.to_string(),
            })
    }

    /// Ordered history of a batch. Unreadable indices are logged and skipped.
    pub async fn get_batch_history(&self, batch_id: u64) -> Result<Vec<SupplyChainEvent>> {
        Ok(self.get_batch_history_report(batch_id).await?.events)
    }

    /// Like [`get_batch_history`](Self::get_batch_history), also reporting
    /// which indices were skipped.
    pub async fn get_batch_history_report(&self, batch_id: u64) -> Result<BatchHistory> {
        let count = self.history_count(batch_id).await?;

        // `buffered` yields in index order regardless of completion order
        let results: Vec<Result<SupplyChainEvent>> = stream::iter(0..count)
            .map(|index| self.read_event(batch_id, index))
            .buffered(self.concurrency())
            .collect()
            .await;

        let mut history = BatchHistory {
            batch_id,
            events: Vec::with_capacity(results.len()),
            skipped: Vec::new(),
        };
        for result in results {
            match result {
                Ok(event) => history.events.push(event),
                Err(e) => {
                    tracing::warn!(batch_id, error = %e, "skipping unreadable event");
                    if let SdkError::EventRead { index, .. } = e {
                        history.skipped.push(index);
                    }
                }
            }
        }

        Ok(history)
    }

    /// History with each payload decoded
    pub async fn decoded_history(&self, batch_id: u64) -> Result<Vec<DecodedEvent>> {
        let events = self.get_batch_history(batch_id).await?;
        Ok(events
            .into_iter()
            .map(|event| {
                let decoded = codec::decode(&event.data_hash);
                DecodedEvent { event, decoded }
            })
            .collect())
    }

    /// Up to `limit` batches, most recent first. Unreadable batches are skipped.
    pub async fn get_all_batches(&self, limit: usize) -> Result<Vec<Batch>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let highest = self.next_batch_id().await?.saturating_sub(1);

        let mut reads = pin!(stream::iter((1..=highest).rev())
            .map(|batch_id| async move { (batch_id, self.get_batch(batch_id).await) })
            .buffered(self.concurrency()));

        let mut batches = Vec::new();
        while let Some((batch_id, result)) = reads.next().await {
            match result {
                Ok(batch) => {
                    batches.push(batch);
                    if batches.len() >= limit {
                        break;
                    }
                }
                Err(e) => tracing::warn!(batch_id, error = %e, "skipping unreadable batch"),
            }
        }

        Ok(batches)
    }

    /// Recent batches created by `creator`.
    ///
    /// Scans only the most recent `scan_bound` batches.
    pub async fn get_batches_by_creator(&self, creator: &str, limit: usize) -> Result<Vec<Batch>> {
        let scanned = self.get_all_batches(self.client.config().scan_bound).await?;
        Ok(scanned
            .into_iter()
            .filter(|batch| batch.creator.eq_ignore_ascii_case(creator))
            .take(limit)
            .collect())
    }

    /// Recent batches on which `actor` recorded at least one event.
    ///
    /// Scans only the most recent `scan_bound` batches and reads the history of
    /// each until `limit` matches are found.
    pub async fn get_batches_with_user_events(
        &self,
        actor: &str,
        limit: usize,
    ) -> Result<Vec<Batch>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let candidates = self.get_all_batches(self.client.config().scan_bound).await?;

        let mut scans = pin!(stream::iter(candidates)
            .map(|batch| async move {
                let history = self.get_batch_history(batch.id).await;
                (batch, history)
            })
            .buffered(self.concurrency()));

        let mut matches = Vec::new();
        while let Some((batch, history)) = scans.next().await {
            match history {
                Ok(events) => {
                    if events.iter().any(|event| event.is_recorded_by(actor)) {
                        matches.push(batch);
                        if matches.len() >= limit {
                            break;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(batch_id = batch.id, error = %e, "skipping batch with unreadable history")
                }
            }
        }

        Ok(matches)
    }

    /// Rebuild the attached index from the ledger. Returns the number of
    /// batches indexed.
    pub async fn backfill_index(&self) -> Result<usize> {
        let index = self.index.as_ref().ok_or_else(|| {
            SdkError::InvalidConfig("no participation index attached".into())
        })?;

        let batches = self.get_all_batches(usize::MAX).await?;
        index.clear().await;

        for batch in &batches {
            index
                .apply(&LedgerLog::BatchCreated {
                    batch_id: batch.id,
                    creator: batch.creator.clone(),
                    product_type: batch.product_type.clone(),
                })
                .await;

            match self.get_batch_history(batch.id).await {
                Ok(events) => {
                    for event in events {
                        index
                            .apply(&LedgerLog::EventRecorded {
                                batch_id: batch.id,
                                event_type: event.event_type,
                                actor: event.actor,
                                data_hash: event.data_hash,
                            })
                            .await;
                    }
                }
                Err(e) => tracing::warn!(batch_id = batch.id, error = %e, "history not indexed"),
            }
        }

        tracing::info!(batches = batches.len(), "participation index rebuilt");
        Ok(batches.len())
    }
}

fn missing_or(error: SdkError, batch_id: u64) -> SdkError {
    if error.is_missing_batch() {
        SdkError::BatchNotFound(batch_id)
    } else {
        error
    }
}
