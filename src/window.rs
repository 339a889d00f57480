//! Janela deslizante de trades por instrumento

use crate::types::{MaEntry, Trade, WINDOW_SECS};

/// Buffer limitado de trades, em ordem de chegada.
///
/// Logicamente é uma janela de 15 minutos, fisicamente é limitada por
/// capacidade: ao saturar, novos trades são rejeitados (os mais antigos
/// permanecem até a próxima compactação).
#[derive(Debug)]
pub struct WindowStore {
    trades: Vec<Trade>,
    capacity: usize,
}

/// Inserção rejeitada por falta de espaço.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferFull;

impl WindowStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            trades: Vec::new(),
            capacity,
        }
    }

    pub fn insert(&mut self, trade: Trade) -> Result<(), BufferFull> {
        if self.trades.len() >= self.capacity {
            return Err(BufferFull);
        }
        self.trades.push(trade);
        Ok(())
    }

    /// Compacta a janela em `now` e resume os trades retidos.
    ///
    /// Destrutivo: descarta tudo com `timestamp < now - 15min`. Deve ser
    /// chamado no máximo uma vez por ciclo.
    pub fn compact_and_summarize(&mut self, now: f64) -> MaEntry {
        let cutoff = now - WINDOW_SECS;
        self.trades.retain(|t| t.timestamp >= cutoff);

        let mut sum_price = 0.0;
        let mut total_volume = 0.0;
        let mut sum_delay = 0.0;
        for trade in &self.trades {
            sum_price += trade.price;
            total_volume += trade.volume;
            sum_delay += trade.processing_delay;
        }

        // Sem dados: zeros, nunca NaN
        let count = self.trades.len();
        if count == 0 {
            return MaEntry {
                timestamp: now,
                ..MaEntry::default()
            };
        }

        MaEntry {
            timestamp: now,
            moving_avg: sum_price / count as f64,
            total_volume,
            avg_delay: sum_delay / count as f64,
        }
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(timestamp: f64, price: f64, volume: f64) -> Trade {
        Trade {
            timestamp,
            price,
            volume,
            processing_delay: 0.001,
        }
    }

    #[test]
    fn compaction_keeps_only_trades_inside_window() {
        let now = 10_000.0;
        let mut store = WindowStore::with_capacity(16);
        let stamps = [now - 1200.0, now - 901.0, now - 900.0, now - 300.0, now - 1.0];
        for (i, ts) in stamps.iter().enumerate() {
            store.insert(trade(*ts, 100.0 + i as f64, 1.0)).unwrap();
        }

        store.compact_and_summarize(now);

        let kept: Vec<f64> = store.trades().iter().map(|t| t.timestamp).collect();
        assert_eq!(kept, vec![now - 900.0, now - 300.0, now - 1.0]);
        assert!(store.trades().iter().all(|t| t.timestamp >= now - 900.0));
    }

    #[test]
    fn summary_is_mean_price_and_total_volume() {
        let now = 5_000.0;
        let mut store = WindowStore::with_capacity(16);
        store.insert(trade(now - 10.0, 10.0, 1.5)).unwrap();
        store.insert(trade(now - 5.0, 20.0, 2.5)).unwrap();
        store.insert(trade(now - 1.0, 30.0, 1.0)).unwrap();
        store.insert(trade(now - 2000.0, 1000.0, 50.0)).unwrap();

        let entry = store.compact_and_summarize(now);

        assert_eq!(entry.timestamp, now);
        assert!((entry.moving_avg - 20.0).abs() < 1e-12);
        assert!((entry.total_volume - 5.0).abs() < 1e-12);
        assert!((entry.avg_delay - 0.001).abs() < 1e-12);
    }

    #[test]
    fn empty_window_yields_zeros() {
        let mut store = WindowStore::with_capacity(4);
        store.insert(trade(0.0, 50.0, 1.0)).unwrap();

        let entry = store.compact_and_summarize(10_000.0);

        assert!(store.is_empty());
        assert_eq!(entry.moving_avg, 0.0);
        assert_eq!(entry.total_volume, 0.0);
        assert_eq!(entry.avg_delay, 0.0);
        assert!(!entry.moving_avg.is_nan());
    }

    #[test]
    fn insert_past_capacity_is_rejected_and_keeps_contents() {
        let mut store = WindowStore::with_capacity(3);
        for i in 0..3 {
            store.insert(trade(i as f64, i as f64, 1.0)).unwrap();
        }

        assert_eq!(store.insert(trade(99.0, 99.0, 1.0)), Err(BufferFull));
        assert_eq!(store.len(), 3);
        let prices: Vec<f64> = store.trades().iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn compaction_frees_capacity() {
        let mut store = WindowStore::with_capacity(2);
        store.insert(trade(0.0, 1.0, 1.0)).unwrap();
        store.insert(trade(1.0, 2.0, 1.0)).unwrap();
        assert!(store.insert(trade(2.0, 3.0, 1.0)).is_err());

        store.compact_and_summarize(2000.0);

        assert!(store.insert(trade(1999.0, 4.0, 1.0)).is_ok());
    }
}
