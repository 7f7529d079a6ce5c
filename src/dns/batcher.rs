use trust_dns_proto::rr::Record;

/// Default number of records per transfer response message.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Groups streamed zone records into fixed-count batches, one batch per response message.
///
/// Batches are sized by record count only, the encoded size of the records is not considered.
#[derive(Debug)]
pub(crate) struct RecordBatcher {
    batch_size: usize,
    pending: Vec<Record>,
}

impl RecordBatcher {
    pub(crate) fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            pending: Vec::with_capacity(batch_size),
        }
    }

    /// Add a record, returning a full batch once `batch_size` records are pending.
    pub(crate) fn push(&mut self, record: Record) -> Option<Vec<Record>> {
        self.pending.push(record);
        if self.pending.len() < self.batch_size {
            return None;
        }
        Some(std::mem::replace(
            &mut self.pending,
            Vec::with_capacity(self.batch_size),
        ))
    }

    /// Take whatever is pending, if anything.
    pub(crate) fn finish(&mut self) -> Option<Vec<Record>> {
        if self.pending.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.pending))
    }

    /// Drop pending records, returning how many were dropped.
    pub(crate) fn discard(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}
