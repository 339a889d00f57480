//! Destino dos registros (transações, médias móveis, correlações, timing)

use crate::types::SinkRecord;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;

/// Destino append-only dos registros do núcleo.
///
/// `emit` é chamado com o lock da tabela adquirido, então NÃO pode fazer I/O
/// nem bloquear: implementações apenas enfileiram.
pub trait RecordSink: Send + Sync {
    fn emit(&self, record: SinkRecord);
}

/// Envia registros para a thread de I/O via channel (hot path: só um push).
pub struct ChannelSink {
    tx: mpsc::Sender<SinkRecord>,
    closed: AtomicU64,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<SinkRecord>) -> Self {
        Self {
            tx,
            closed: AtomicU64::new(0),
        }
    }

    /// Registros perdidos porque a thread de I/O já terminou.
    pub fn dropped(&self) -> u64 {
        self.closed.load(Ordering::Relaxed)
    }
}

impl RecordSink for ChannelSink {
    fn emit(&self, record: SinkRecord) {
        if self.tx.send(record).is_err() {
            self.closed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Guarda tudo em memória. Útil em testes e diagnósticos.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<SinkRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.records.lock().clone()
    }

    pub fn take(&self) -> Vec<SinkRecord> {
        std::mem::take(&mut *self.records.lock())
    }
}

impl RecordSink for MemorySink {
    fn emit(&self, record: SinkRecord) {
        self.records.lock().push(record);
    }
}
