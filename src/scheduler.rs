//! Agendador alinhado ao minuto
//!
//! Em vez de dormir um período fixo (que acumula deriva), cada iteração
//! recalcula a próxima fronteira de minuto do relógio de parede e dorme até
//! ela. O cálculo sempre começa poucos milissegundos após a virada do minuto,
//! independente de quanto o ciclo anterior demorou.

use crate::correlation::run_correlation_pass;
use crate::sink::RecordSink;
use crate::table::InstrumentTable;
use crate::types::{now_secs, SinkRecord};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Período padrão do ciclo (segundos).
pub const CYCLE_SECS: f64 = 60.0;

/// Fronteira mais recente já cruzada.
pub fn scheduled_boundary(now: f64, period: f64) -> f64 {
    (now / period).floor() * period
}

/// Próxima fronteira, estritamente posterior a `now`.
pub fn next_boundary(now: f64, period: f64) -> f64 {
    scheduled_boundary(now, period) + period
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Waiting,
    Computing,
    CorrelationPass { now: f64 },
}

/// Resumo de um ciclo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub instruments: usize,
    pub correlated: usize,
}

pub struct MinuteScheduler {
    table: Arc<InstrumentTable>,
    sink: Arc<dyn RecordSink>,
    cancel: CancellationToken,
    period: f64,
}

impl MinuteScheduler {
    pub fn new(
        table: Arc<InstrumentTable>,
        sink: Arc<dyn RecordSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            table,
            sink,
            cancel,
            period: CYCLE_SECS,
        }
    }

    /// Troca o período (em segundos). Usado em testes.
    pub fn with_period(mut self, period: f64) -> Self {
        self.period = period;
        self
    }

    /// Loop principal: Waiting → Computing → CorrelationPass → Waiting.
    ///
    /// Sai assim que o cancelamento é sinalizado durante a espera; um ciclo já
    /// iniciado termina antes. Retorna o número de ciclos completos.
    pub async fn run(&self) -> u64 {
        tracing::info!(period = self.period, "agendador iniciado");
        let mut cycles = 0u64;
        let mut phase = Phase::Waiting;

        loop {
            phase = match phase {
                Phase::Waiting => {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    let now = now_secs();
                    let jitter = now - scheduled_boundary(now, self.period);
                    self.sink.emit(SinkRecord::Timing {
                        timestamp: now,
                        jitter,
                    });
                    tracing::debug!("diferença agendado vs real: {:.3} s", jitter);

                    let wait = (next_boundary(now, self.period) - now).max(0.0);
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs_f64(wait)) => {}
                    }
                    Phase::Computing
                }
                Phase::Computing => {
                    let now = now_secs();
                    self.table.compute_moving_averages(now);
                    Phase::CorrelationPass { now }
                }
                Phase::CorrelationPass { now } => {
                    let correlated = self.correlate(now).await;
                    cycles += 1;
                    tracing::debug!(cycle = cycles, correlated, "ciclo concluído");
                    Phase::Waiting
                }
            };
        }

        tracing::info!(cycles, "agendador encerrado");
        cycles
    }

    /// Um ciclo completo em `now`, sem espera.
    pub async fn run_cycle(&self, now: f64) -> CycleReport {
        let instruments = self.table.compute_moving_averages(now);
        let correlated = self.correlate(now).await;
        CycleReport {
            instruments,
            correlated,
        }
    }

    /// Snapshot sob lock, cálculo fora dele, resultados aplicados um a um.
    async fn correlate(&self, now: f64) -> usize {
        let snapshot = self.table.snapshot_for_correlation();
        if snapshot.len() < 2 {
            return 0;
        }
        let results = run_correlation_pass(snapshot, now).await;
        let count = results.len();
        for (table_index, result) in results {
            self.table.apply_correlation_result(table_index, result);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::table::TableLimits;
    use crate::types::{Correlation, MA_HISTORY_SIZE};

    fn scheduler() -> (MinuteScheduler, Arc<InstrumentTable>, Arc<MemorySink>, CancellationToken) {
        let sink = Arc::new(MemorySink::new());
        let table = Arc::new(InstrumentTable::new(TableLimits::default(), sink.clone()));
        let cancel = CancellationToken::new();
        let sched = MinuteScheduler::new(table.clone(), sink.clone(), cancel.clone());
        (sched, table, sink, cancel)
    }

    #[test]
    fn boundaries_are_minute_aligned() {
        assert_eq!(scheduled_boundary(125.3, 60.0), 120.0);
        assert_eq!(next_boundary(125.3, 60.0), 180.0);
        assert_eq!(scheduled_boundary(120.0, 60.0), 120.0);
        assert_eq!(next_boundary(120.0, 60.0), 180.0);
    }

    #[tokio::test]
    async fn cycles_fill_history_and_correlate_full_rings() {
        let (sched, table, _sink, _cancel) = scheduler();
        let base = 1_000_000.0;

        // A e B com tendência idêntica; C chega tarde
        for minute in 0..MA_HISTORY_SIZE {
            let now = base + 60.0 * minute as f64;
            let price = 100.0 + minute as f64;
            table.record_trade("A", price, 1.0, now - 1.0, now - 1.0).unwrap();
            table.record_trade("B", price * 2.0, 1.0, now - 1.0, now - 1.0).unwrap();
            if minute == MA_HISTORY_SIZE - 1 {
                table.record_trade("C", 5.0, 1.0, now - 1.0, now - 1.0).unwrap();
            }
            let report = sched.run_cycle(now).await;
            if minute < MA_HISTORY_SIZE - 1 {
                assert_eq!(report.correlated, 0);
            } else {
                assert_eq!(report.correlated, 2);
            }
        }

        let a = table.correlation_result("A").unwrap();
        let b = table.correlation_result("B").unwrap();
        assert_eq!(a.correlation.peer(), "B");
        assert_eq!(b.correlation.peer(), "A");
        assert!((a.correlation.coefficient().unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(table.correlation_result("C").unwrap().correlation, Correlation::Undefined);
    }

    #[tokio::test]
    async fn cancelled_scheduler_exits_without_cycling() {
        let (sched, _table, _sink, cancel) = scheduler();
        cancel.cancel();

        let cycles = tokio::time::timeout(Duration::from_secs(1), sched.run())
            .await
            .expect("agendador deveria sair imediatamente");
        assert_eq!(cycles, 0);
    }

    #[tokio::test]
    async fn cancellation_interrupts_sleep() {
        let (sched, _table, sink, cancel) = scheduler();
        let sched = sched.with_period(3600.0);

        let handle = tokio::spawn(async move { sched.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let cycles = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancelamento deveria interromper a espera")
            .unwrap();
        assert_eq!(cycles, 0);
        assert!(matches!(sink.records().first(), Some(SinkRecord::Timing { .. })));
    }

    #[tokio::test]
    async fn short_period_loop_runs_cycles() {
        let (sched, table, sink, cancel) = scheduler();
        let sched = sched.with_period(0.1);
        table.record_trade("A", 1.0, 1.0, now_secs(), now_secs()).unwrap();

        let handle = tokio::spawn(async move { sched.run().await });
        tokio::time::sleep(Duration::from_millis(450)).await;
        cancel.cancel();
        let cycles = handle.await.unwrap();

        assert!(cycles >= 2);
        let averages = sink
            .records()
            .iter()
            .filter(|r| matches!(r, SinkRecord::MovingAverage { .. }))
            .count();
        assert_eq!(averages as u64, cycles);
    }
}
