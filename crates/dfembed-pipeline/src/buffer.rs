//! Bounded write buffer between the worker threads and the store writer.
//!
//! Producers are plain OS threads and block on [`BufferProducer::push`] while
//! the buffer holds `capacity` records. The single [`BufferDrain`] lives on
//! the async side and hands out batches of `capacity` records, or whatever is
//! left once every producer has been dropped.

use tokio::sync::mpsc;

use dfembed_core::types::EmbeddingRecord;

/// The drain side has been closed; the pushed record was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferClosed;

pub fn write_buffer(capacity: usize) -> (BufferProducer, BufferDrain) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (BufferProducer { tx }, BufferDrain { rx, capacity })
}

#[derive(Debug, Clone)]
pub struct BufferProducer {
    tx: mpsc::Sender<EmbeddingRecord>,
}

impl BufferProducer {
    /// Blocks the calling thread while the buffer is full. Must not be called
    /// from an async task.
    pub fn push(&self, record: EmbeddingRecord) -> Result<(), BufferClosed> {
        self.tx.blocking_send(record).map_err(|_| BufferClosed)
    }
}

#[derive(Debug)]
pub struct Drained {
    pub records: Vec<EmbeddingRecord>,
    /// No producer is left: this is the last non-empty batch.
    pub last: bool,
}

#[derive(Debug)]
pub struct BufferDrain {
    rx: mpsc::Receiver<EmbeddingRecord>,
    capacity: usize,
}

impl BufferDrain {
    pub fn capacity(&self) -> usize { self.capacity }

    /// Records currently queued.
    pub fn len(&self) -> usize { self.rx.len() }

    pub fn is_empty(&self) -> bool { self.rx.is_empty() }

    /// Wait for a full batch, or for all producers to finish. `None` once the
    /// buffer is closed and empty.
    pub async fn next_batch(&mut self) -> Option<Drained> {
        let mut records = Vec::with_capacity(self.capacity);
        let mut last = false;
        while records.len() < self.capacity {
            let limit = self.capacity - records.len();
            if self.rx.recv_many(&mut records, limit).await == 0 {
                last = true;
                break;
            }
        }
        if records.is_empty() { None } else { Some(Drained { records, last }) }
    }

    /// Stop accepting records and discard what is queued. Blocked producers
    /// wake up with [`BufferClosed`].
    pub fn close(&mut self) -> usize {
        self.rx.close();
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() { discarded += 1; }
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn rec(i: u64) -> EmbeddingRecord { EmbeddingRecord::new(i, vec![i as f32], None) }

    #[tokio::test]
    async fn full_batches_then_final_remainder() {
        let (producer, mut drain) = write_buffer(4);
        let handle = thread::spawn(move || {
            for i in 0..10 { producer.push(rec(i)).unwrap(); }
        });
        let mut sizes = Vec::new();
        let mut ids = Vec::new();
        while let Some(batch) = drain.next_batch().await {
            sizes.push((batch.records.len(), batch.last));
            ids.extend(batch.records.iter().map(|r| r.row_id));
        }
        handle.join().unwrap();
        assert_eq!(sizes, vec![(4, false), (4, false), (2, true)]);
        assert_eq!(ids, (0..10).collect::<Vec<_>>(), "FIFO within one producer");
    }

    #[tokio::test]
    async fn occupancy_never_exceeds_capacity() {
        let (producer, mut drain) = write_buffer(3);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let p = producer.clone();
                thread::spawn(move || for i in 0..25 { p.push(rec(t * 100 + i)).unwrap(); })
            })
            .collect();
        drop(producer);
        let mut total = 0;
        loop {
            assert!(drain.len() <= drain.capacity());
            match drain.next_batch().await {
                Some(batch) => { assert!(batch.records.len() <= 3); total += batch.records.len(); }
                None => break,
            }
        }
        for h in handles { h.join().unwrap(); }
        assert_eq!(total, 100);
    }

    #[tokio::test]
    async fn close_unblocks_producers() {
        let (producer, mut drain) = write_buffer(1);
        let handle = thread::spawn(move || {
            let mut pushed = 0;
            for i in 0..10 {
                if producer.push(rec(i)).is_err() { break; }
                pushed += 1;
            }
            pushed
        });
        // Wait until the producer is parked on a full buffer.
        while drain.is_empty() { tokio::task::yield_now().await; }
        drain.close();
        let pushed = tokio::task::spawn_blocking(move || handle.join().unwrap()).await.unwrap();
        assert!(pushed < 10);
        assert!(drain.next_batch().await.is_none());
    }

    #[tokio::test]
    async fn capacity_one_drains_single_records() {
        let (producer, mut drain) = write_buffer(1);
        let handle = thread::spawn(move || for i in 0..5 { producer.push(rec(i)).unwrap(); });
        let mut batches = 0;
        while let Some(batch) = drain.next_batch().await {
            assert_eq!(batch.records.len(), 1);
            batches += 1;
        }
        handle.join().unwrap();
        assert_eq!(batches, 5);
    }
}
