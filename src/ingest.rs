//! Entrada do núcleo: eventos vindos do adaptador do feed

use crate::error::IngestError;
use crate::table::InstrumentTable;
use crate::types::now_secs;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Interface que o adaptador do feed enxerga.
pub trait FeedListener: Send + Sync {
    fn on_trade(
        &self,
        instrument: &str,
        price: f64,
        volume: f64,
        received_at: f64,
    ) -> Result<(), IngestError>;

    fn on_connectivity_change(&self, connected: bool);

    /// Evento descartado no adaptador (JSON inválido, campo ausente).
    fn on_malformed(&self, reason: &str);
}

/// Contadores da ingestão (fora os da tabela).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub malformed: u64,
    pub rejected_after_cancel: u64,
    pub disconnects: u64,
}

/// Valida eventos e repassa para a tabela.
///
/// Após o cancelamento, novos trades são recusados com `Cancelled`.
pub struct Ingestor {
    table: Arc<InstrumentTable>,
    cancel: CancellationToken,
    connected: AtomicBool,
    malformed: AtomicU64,
    rejected_after_cancel: AtomicU64,
    disconnects: AtomicU64,
}

impl Ingestor {
    pub fn new(table: Arc<InstrumentTable>, cancel: CancellationToken) -> Self {
        Self {
            table,
            cancel,
            connected: AtomicBool::new(false),
            malformed: AtomicU64::new(0),
            rejected_after_cancel: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            malformed: self.malformed.load(Ordering::Relaxed),
            rejected_after_cancel: self.rejected_after_cancel.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
        }
    }

    fn validate(instrument: &str, price: f64, volume: f64, received_at: f64) -> Result<(), String> {
        if instrument.trim().is_empty() {
            return Err("instrumento vazio".to_string());
        }
        // Vira nome de diretório no sink
        if !instrument
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(format!("instrumento inválido: {instrument:?}"));
        }
        if !price.is_finite() || price < 0.0 {
            return Err(format!("preço inválido: {price}"));
        }
        if !volume.is_finite() || volume < 0.0 {
            return Err(format!("volume inválido: {volume}"));
        }
        if !received_at.is_finite() || received_at <= 0.0 {
            return Err(format!("timestamp inválido: {received_at}"));
        }
        Ok(())
    }
}

impl FeedListener for Ingestor {
    fn on_trade(
        &self,
        instrument: &str,
        price: f64,
        volume: f64,
        received_at: f64,
    ) -> Result<(), IngestError> {
        if self.cancel.is_cancelled() {
            self.rejected_after_cancel.fetch_add(1, Ordering::Relaxed);
            return Err(IngestError::Cancelled);
        }
        if let Err(reason) = Self::validate(instrument, price, volume, received_at) {
            self.on_malformed(&reason);
            return Err(IngestError::MalformedTradeEvent(reason));
        }

        self.table
            .record_trade(instrument, price, volume, received_at, now_secs())?;
        tracing::trace!(instrument, price, volume, "trade registrado");
        Ok(())
    }

    fn on_connectivity_change(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::Relaxed);
        if was == connected {
            return;
        }
        if connected {
            tracing::info!("feed conectado");
        } else {
            self.disconnects.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("feed desconectado, trades ausentes até reconectar");
        }
    }

    fn on_malformed(&self, reason: &str) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(reason, "evento malformado descartado");
    }
}
