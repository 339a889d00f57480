//! Tabela por instrumento (estado compartilhado sob um único lock)
//!
//! Toda mutação passa por um único `Mutex`. A correlação roda FORA do lock,
//! sobre cópias (`snapshot_for_correlation`), e o resultado volta via
//! `apply_correlation_result`. Assim o tempo de lock por ciclo é O(n) e não O(n²).

use crate::error::IngestError;
use crate::history::MaHistory;
use crate::sink::RecordSink;
use crate::types::{
    CorrelationResult, MaEntry, SinkRecord, Trade, MAX_INSTRUMENTS, MA_HISTORY_SIZE,
    TRADE_BUFFER_SIZE,
};
use crate::window::WindowStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Limites da tabela.
#[derive(Debug, Clone, Copy)]
pub struct TableLimits {
    pub max_instruments: usize,
    pub trade_capacity: usize,
}

impl Default for TableLimits {
    fn default() -> Self {
        Self {
            max_instruments: MAX_INSTRUMENTS,
            trade_capacity: TRADE_BUFFER_SIZE,
        }
    }
}

/// Cópia do histórico de um instrumento com anel completo.
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub symbol: String,
    pub table_index: usize,
    pub history: [MaEntry; MA_HISTORY_SIZE],
}

impl SnapshotEntry {
    pub fn ma_values(&self) -> [f64; MA_HISTORY_SIZE] {
        self.history.map(|e| e.moving_avg)
    }
}

/// Contadores de operação degradada (nunca fatais).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    pub accepted: u64,
    pub buffer_full: u64,
    pub too_many_instruments: u64,
}

#[derive(Debug)]
struct InstrumentState {
    symbol: String,
    window: WindowStore,
    history: MaHistory,
    correlation: CorrelationResult,
}

#[derive(Debug, Default)]
struct TableInner {
    index: HashMap<String, usize>,
    instruments: Vec<InstrumentState>,
}

pub struct InstrumentTable {
    inner: Mutex<TableInner>,
    limits: TableLimits,
    sink: Arc<dyn RecordSink>,
    accepted: AtomicU64,
    buffer_full: AtomicU64,
    too_many_instruments: AtomicU64,
}

impl InstrumentTable {
    pub fn new(limits: TableLimits, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            inner: Mutex::new(TableInner::default()),
            limits,
            sink,
            accepted: AtomicU64::new(0),
            buffer_full: AtomicU64::new(0),
            too_many_instruments: AtomicU64::new(0),
        }
    }

    /// Registra um trade, criando o instrumento na primeira ocorrência.
    pub fn record_trade(
        &self,
        instrument: &str,
        price: f64,
        volume: f64,
        received_at: f64,
        processed_at: f64,
    ) -> Result<(), IngestError> {
        let trade = Trade {
            timestamp: received_at,
            price,
            volume,
            processing_delay: processed_at - received_at,
        };

        let mut inner = self.inner.lock();
        let idx = match inner.index.get(instrument) {
            Some(&idx) => idx,
            None => {
                if inner.instruments.len() >= self.limits.max_instruments {
                    drop(inner);
                    self.too_many_instruments.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(instrument, "limite de instrumentos atingido, trade descartado");
                    return Err(IngestError::TooManyInstruments {
                        instrument: instrument.to_string(),
                        limit: self.limits.max_instruments,
                    });
                }
                let idx = inner.instruments.len();
                inner.instruments.push(InstrumentState {
                    symbol: instrument.to_string(),
                    window: WindowStore::with_capacity(self.limits.trade_capacity),
                    history: MaHistory::new(),
                    correlation: CorrelationResult::default(),
                });
                inner.index.insert(instrument.to_string(), idx);
                tracing::info!(instrument, idx, "novo instrumento registrado");
                idx
            }
        };

        let state = &mut inner.instruments[idx];
        if state.window.insert(trade).is_err() {
            let capacity = state.window.capacity();
            drop(inner);
            self.buffer_full.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(instrument, capacity, "buffer cheio, trade descartado");
            return Err(IngestError::BufferFull {
                instrument: instrument.to_string(),
                capacity,
            });
        }

        self.sink.emit(SinkRecord::Transaction {
            instrument: instrument.to_string(),
            trade,
        });
        self.accepted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Compacta cada janela em `now`, empilha a média no anel e a envia ao sink.
    ///
    /// Um único lock para a passada inteira: nenhuma janela é compactada duas
    /// vezes para a mesma fronteira. Retorna quantos instrumentos foram processados.
    pub fn compute_moving_averages(&self, now: f64) -> usize {
        let mut inner = self.inner.lock();
        for state in inner.instruments.iter_mut() {
            let entry = state.window.compact_and_summarize(now);
            state.history.push(entry);
            tracing::debug!(
                instrument = %state.symbol,
                moving_avg = entry.moving_avg,
                total_volume = entry.total_volume,
                retained = state.window.len(),
                "média móvel calculada"
            );
            self.sink.emit(SinkRecord::MovingAverage {
                instrument: state.symbol.clone(),
                entry,
            });
        }
        inner.instruments.len()
    }

    /// Copia os anéis completos. O lock é liberado antes de qualquer cálculo.
    pub fn snapshot_for_correlation(&self) -> Vec<SnapshotEntry> {
        let inner = self.inner.lock();
        inner
            .instruments
            .iter()
            .enumerate()
            .filter_map(|(table_index, state)| {
                state.history.full_window().map(|history| SnapshotEntry {
                    symbol: state.symbol.clone(),
                    table_index,
                    history,
                })
            })
            .collect()
    }

    pub fn apply_correlation_result(&self, table_index: usize, result: CorrelationResult) {
        let mut inner = self.inner.lock();
        let Some(state) = inner.instruments.get_mut(table_index) else {
            tracing::warn!(table_index, "resultado de correlação para índice inexistente");
            return;
        };
        state.correlation = result.clone();
        self.sink.emit(SinkRecord::Correlation {
            instrument: state.symbol.clone(),
            result,
        });
    }

    pub fn correlation_result(&self, instrument: &str) -> Option<CorrelationResult> {
        let inner = self.inner.lock();
        let idx = *inner.index.get(instrument)?;
        Some(inner.instruments[idx].correlation.clone())
    }

    pub fn window_trades(&self, instrument: &str) -> Option<Vec<Trade>> {
        let inner = self.inner.lock();
        let idx = *inner.index.get(instrument)?;
        Some(inner.instruments[idx].window.trades().to_vec())
    }

    /// Símbolos em ordem de criação (a mesma ordem dos índices da tabela).
    pub fn instruments(&self) -> Vec<String> {
        let inner = self.inner.lock();
        inner.instruments.iter().map(|s| s.symbol.clone()).collect()
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            buffer_full: self.buffer_full.load(Ordering::Relaxed),
            too_many_instruments: self.too_many_instruments.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::types::Correlation;

    fn table_with(limits: TableLimits) -> (InstrumentTable, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (InstrumentTable::new(limits, sink.clone()), sink)
    }

    #[test]
    fn record_trade_creates_instrument_and_emits_transaction() {
        let (table, sink) = table_with(TableLimits::default());

        table.record_trade("BTC-USDT", 100.0, 0.5, 10.0, 10.25).unwrap();

        assert_eq!(table.instruments(), vec!["BTC-USDT".to_string()]);
        let trades = table.window_trades("BTC-USDT").unwrap();
        assert_eq!(trades.len(), 1);
        assert!((trades[0].processing_delay - 0.25).abs() < 1e-12);
        assert!(matches!(
            sink.records().as_slice(),
            [SinkRecord::Transaction { instrument, .. }] if instrument == "BTC-USDT"
        ));
        assert_eq!(table.stats().accepted, 1);
    }

    #[test]
    fn instrument_names_are_case_sensitive() {
        let (table, _) = table_with(TableLimits::default());
        table.record_trade("btc-usdt", 1.0, 1.0, 0.0, 0.0).unwrap();
        table.record_trade("BTC-USDT", 1.0, 1.0, 0.0, 0.0).unwrap();
        assert_eq!(table.instruments().len(), 2);
    }

    #[test]
    fn unknown_instruments_beyond_cap_are_rejected() {
        let (table, _) = table_with(TableLimits {
            max_instruments: 2,
            trade_capacity: 10,
        });
        table.record_trade("A", 1.0, 1.0, 0.0, 0.0).unwrap();
        table.record_trade("B", 1.0, 1.0, 0.0, 0.0).unwrap();

        let err = table.record_trade("C", 1.0, 1.0, 0.0, 0.0).unwrap_err();
        assert!(matches!(err, IngestError::TooManyInstruments { limit: 2, .. }));
        // Instrumentos conhecidos continuam aceitando
        table.record_trade("A", 2.0, 1.0, 0.0, 0.0).unwrap();
        assert_eq!(table.stats().too_many_instruments, 1);
        assert_eq!(table.instruments(), vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn full_buffer_rejects_without_emitting() {
        let (table, sink) = table_with(TableLimits {
            max_instruments: 8,
            trade_capacity: 2,
        });
        table.record_trade("A", 1.0, 1.0, 0.0, 0.0).unwrap();
        table.record_trade("A", 2.0, 1.0, 1.0, 1.0).unwrap();

        let err = table.record_trade("A", 3.0, 1.0, 2.0, 2.0).unwrap_err();
        assert!(matches!(err, IngestError::BufferFull { capacity: 2, .. }));

        let prices: Vec<f64> = table
            .window_trades("A")
            .unwrap()
            .iter()
            .map(|t| t.price)
            .collect();
        assert_eq!(prices, vec![1.0, 2.0]);
        assert_eq!(sink.records().len(), 2);
        assert_eq!(table.stats().buffer_full, 1);
    }

    #[test]
    fn snapshot_contains_only_full_rings() {
        let (table, _) = table_with(TableLimits::default());
        table.record_trade("A", 1.0, 1.0, 0.0, 0.0).unwrap();
        for minute in 0..MA_HISTORY_SIZE {
            table.compute_moving_averages(minute as f64 * 60.0);
        }
        // B aparece depois: anel incompleto
        table.record_trade("B", 1.0, 1.0, 500.0, 500.0).unwrap();
        table.compute_moving_averages(600.0);

        let snapshot = table.snapshot_for_correlation();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].symbol, "A");
        assert_eq!(snapshot[0].table_index, 0);
        assert_eq!(snapshot[0].history[MA_HISTORY_SIZE - 1].timestamp, 600.0);
    }

    #[test]
    fn apply_correlation_result_overwrites_and_emits() {
        let (table, sink) = table_with(TableLimits::default());
        table.record_trade("A", 1.0, 1.0, 0.0, 0.0).unwrap();
        sink.take();

        let result = CorrelationResult {
            computed_at: 60.0,
            correlation: Correlation::Defined {
                peer: "B".to_string(),
                coefficient: 0.5,
                sample_timestamp: 0.0,
            },
        };
        table.apply_correlation_result(0, result.clone());
        table.apply_correlation_result(7, result.clone());

        assert_eq!(table.correlation_result("A"), Some(result));
        assert_eq!(sink.records().len(), 1);
    }
}
