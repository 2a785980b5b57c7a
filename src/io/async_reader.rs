//! Asynchronous CSV reader for replay input
//!
//! Provides a streaming interface over transfer requests from a CSV file,
//! read in batches so a large replay never sits in memory at once.
//!
//! # Architecture
//!
//! ```text
//! CSV Reader → AsyncReader → Batches of TransferRequests
//!                  ↓
//!           csv_format module
//!           (TransferCsvRecord, convert_csv_record)
//! ```

use crate::io::csv_format::{convert_csv_record, TransferCsvRecord};
use crate::types::TransferRequest;
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

/// Asynchronous CSV reader
///
/// Rows that fail to parse or validate are logged and skipped.
pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
    rows_read: u64,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self {
            csv_reader,
            rows_read: 0,
        }
    }

    /// Read up to `batch_size` valid transfer requests
    ///
    /// Returns an empty vector when the end of the file is reached.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<TransferRequest> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<TransferCsvRecord>();

        while batch.len() < batch_size {
            let record = match records.next().await {
                Some(record) => record,
                None => break,
            };
            self.rows_read += 1;

            match record {
                Ok(csv_record) => match convert_csv_record(csv_record) {
                    Ok(request) => batch.push(request),
                    Err(e) => warn!(row = self.rows_read, code = %e.code(), "skipping transfer row: {e}"),
                },
                Err(e) => warn!(row = self.rows_read, "CSV parse error: {e}"),
            }
        }

        batch
    }

    /// Number of data rows consumed so far, valid or not
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;

    #[tokio::test]
    async fn test_async_reader_read_batch() {
        let csv_content = "request_id,from,to,amount\n\
            r1,5550001,5550002,100\n\
            r2,5550002,5550003,50\n\
            r3,5550003,5550001,200\n";
        let reader = Cursor::new(csv_content.as_bytes());
        let mut async_reader = AsyncReader::new(reader);

        let batch = async_reader.read_batch(2).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].client_request_id.as_str(), "r1");
        assert_eq!(batch[0].amount, 100);
        assert_eq!(batch[1].client_request_id.as_str(), "r2");

        let batch = async_reader.read_batch(2).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].from.as_str(), "5550003");

        let batch = async_reader.read_batch(2).await;
        assert!(batch.is_empty());
        assert_eq!(async_reader.rows_read(), 3);
    }

    #[tokio::test]
    async fn test_async_reader_empty_csv() {
        let reader = Cursor::new("request_id,from,to,amount\n".as_bytes());
        let mut async_reader = AsyncReader::new(reader);

        let batch = async_reader.read_batch(10).await;
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_async_reader_skips_invalid_rows() {
        let csv_content = "request_id,from,to,amount\n\
            r1,5550001,5550002,0\n\
            r2,not-a-phone,5550002,10\n\
            r3,5550001,5550002,ten\n\
            r4,5550001,5550002,10\n";
        let reader = Cursor::new(csv_content.as_bytes());
        let mut async_reader = AsyncReader::new(reader);

        let batch = async_reader.read_batch(10).await;

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].client_request_id.as_str(), "r4");
        assert_eq!(async_reader.rows_read(), 4);
    }

    #[tokio::test]
    async fn test_async_reader_whitespace_and_missing_key() {
        let csv_content = "request_id,from,to,amount\n  ,  5550001  ,  5550002  ,  10  \n";
        let reader = Cursor::new(csv_content.as_bytes());
        let mut async_reader = AsyncReader::new(reader);

        let batch = async_reader.read_batch(10).await;

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].from.as_str(), "5550001");
        assert_eq!(batch[0].amount, 10);
    }
}
