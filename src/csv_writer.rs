//! Thread de I/O com CPU Affinity
//!
//! Recebe `SinkRecord`s pelo channel e escreve nos CSVs:
//!
//! ```text
//! <data_dir>/<instrumento>/transactions.csv
//! <data_dir>/<instrumento>/moving_average.csv
//! <data_dir>/<instrumento>/correlation.csv
//! <timing_file>
//! ```
//!
//! Roda fora do hot path (core dedicado, prioridade menor), então nenhum
//! lock do núcleo espera por disco.

use crate::cpu_affinity::{set_cpu_affinity, set_thread_priority};
use crate::csv_buffer::CsvBuffer;
use crate::error::SinkError;
use crate::types::{Correlation, CorrelationResult, MaEntry, SinkRecord, Trade};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const TRANSACTIONS_HEADER: &str = "Timestamp,Price,Volume,ProcessingDelay";
pub const MOVING_AVERAGE_HEADER: &str = "Timestamp,MovingAvg,TotalVolume,AvgProcessingDelay";
pub const CORRELATION_HEADER: &str = "Timestamp,OtherSymbol,Correlation,MaxCorrMATime";
pub const TIMING_HEADER: &str = "Timestamp,TimeDiff";

/// Intervalo máximo que uma linha fica só em memória.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Configuração da thread de I/O.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub data_dir: PathBuf,
    pub timing_file: PathBuf,
    pub flush_every: u64,
    pub flush_interval: Duration,
    pub core_id: usize,
}

/// Totais ao final da thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterSummary {
    pub written: u64,
    pub dropped: u64,
}

/// Segundos desde a época → hora local `%Y-%m-%d %H:%M:%S`.
pub fn local_time(ts: f64) -> String {
    DateTime::from_timestamp(ts.floor() as i64, 0)
        .map(|utc| {
            utc.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_default()
}

pub fn transaction_line(trade: &Trade) -> String {
    format!(
        "{},{:.2},{:.4},{:.9}",
        local_time(trade.timestamp),
        trade.price,
        trade.volume,
        trade.processing_delay
    )
}

pub fn moving_average_line(entry: &MaEntry) -> String {
    format!(
        "{},{:.2},{:.4},{:.9}",
        local_time(entry.timestamp),
        entry.moving_avg,
        entry.total_volume,
        entry.avg_delay
    )
}

/// Correlação indefinida vira `N/A,undefined,` para não se confundir com um número.
pub fn correlation_line(result: &CorrelationResult) -> String {
    match &result.correlation {
        Correlation::Undefined => format!("{},N/A,undefined,", local_time(result.computed_at)),
        Correlation::Defined {
            peer,
            coefficient,
            sample_timestamp,
        } => format!(
            "{},{},{:.4},{}",
            local_time(result.computed_at),
            peer,
            coefficient,
            local_time(*sample_timestamp)
        ),
    }
}

pub fn timing_line(timestamp: f64, jitter: f64) -> String {
    format!("{},{:.3}", local_time(timestamp), jitter)
}

#[derive(Clone, Copy)]
enum Stream {
    Transactions,
    MovingAverage,
    Correlation,
}

impl Stream {
    fn file_name(self) -> &'static str {
        match self {
            Stream::Transactions => "transactions.csv",
            Stream::MovingAverage => "moving_average.csv",
            Stream::Correlation => "correlation.csv",
        }
    }

    fn header(self) -> &'static str {
        match self {
            Stream::Transactions => TRANSACTIONS_HEADER,
            Stream::MovingAverage => MOVING_AVERAGE_HEADER,
            Stream::Correlation => CORRELATION_HEADER,
        }
    }
}

/// Os três arquivos de um instrumento. `None` = falhou ao abrir.
struct InstrumentFiles {
    transactions: Option<CsvBuffer>,
    moving_average: Option<CsvBuffer>,
    correlation: Option<CsvBuffer>,
}

impl InstrumentFiles {
    fn open(data_dir: &Path, instrument: &str) -> Self {
        let dir = data_dir.join(instrument);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::error!(dir = %dir.display(), error = %e, "não foi possível criar diretório");
        } else {
            tracing::debug!(dir = %dir.display(), "diretório do instrumento pronto");
        }

        let open = |stream: Stream| {
            let path = dir.join(stream.file_name());
            match CsvBuffer::create(&path, stream.header()) {
                Ok(csv) => {
                    tracing::debug!(path = %path.display(), "arquivo aberto");
                    Some(csv)
                }
                Err(e) => {
                    tracing::error!(error = %e, "não foi possível abrir arquivo");
                    None
                }
            }
        };

        Self {
            transactions: open(Stream::Transactions),
            moving_average: open(Stream::MovingAverage),
            correlation: open(Stream::Correlation),
        }
    }

    fn get(&mut self, stream: Stream) -> Option<&mut CsvBuffer> {
        match stream {
            Stream::Transactions => self.transactions.as_mut(),
            Stream::MovingAverage => self.moving_average.as_mut(),
            Stream::Correlation => self.correlation.as_mut(),
        }
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        for csv in [
            self.transactions.as_mut(),
            self.moving_average.as_mut(),
            self.correlation.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            csv.flush()?;
        }
        Ok(())
    }
}

struct CsvWriter {
    data_dir: PathBuf,
    timing: CsvBuffer,
    instruments: HashMap<String, InstrumentFiles>,
    flush_every: u64,
    summary: WriterSummary,
}

impl CsvWriter {
    fn handle(&mut self, record: SinkRecord) {
        let (instrument, stream, line) = match record {
            SinkRecord::Timing { timestamp, jitter } => {
                let result = self.timing.write_line(&timing_line(timestamp, jitter));
                self.account(result);
                return;
            }
            SinkRecord::Transaction { instrument, trade } => {
                let line = transaction_line(&trade);
                (instrument, Stream::Transactions, line)
            }
            SinkRecord::MovingAverage { instrument, entry } => {
                let line = moving_average_line(&entry);
                (instrument, Stream::MovingAverage, line)
            }
            SinkRecord::Correlation { instrument, result } => {
                let line = correlation_line(&result);
                (instrument, Stream::Correlation, line)
            }
        };

        let data_dir = &self.data_dir;
        let files = self
            .instruments
            .entry(instrument)
            .or_insert_with_key(|name| InstrumentFiles::open(data_dir, name));
        let result = match files.get(stream) {
            Some(csv) => csv.write_line(&line),
            None => {
                self.summary.dropped += 1;
                return;
            }
        };
        self.account(result);
    }

    fn account(&mut self, result: Result<(), SinkError>) {
        match result {
            Ok(()) => {
                self.summary.written += 1;
                if self.flush_every > 0 && self.summary.written % self.flush_every == 0 {
                    self.flush_all();
                }
            }
            Err(e) => {
                self.summary.dropped += 1;
                tracing::error!(error = %e, "falha ao escrever registro");
            }
        }
    }

    fn flush_all(&mut self) {
        if let Err(e) = self.timing.flush() {
            tracing::error!(error = %e, "falha no flush do timing");
        }
        for files in self.instruments.values_mut() {
            if let Err(e) = files.flush() {
                tracing::error!(error = %e, "falha no flush");
            }
        }
    }
}

/// Cria o diretório de dados e o arquivo de timing, e sobe a thread de I/O.
///
/// Falhas aqui são fatais para o processo (sem sink não há o que rodar).
/// A thread termina quando todos os `Sender`s forem descartados.
pub fn spawn_csv_writer(
    config: WriterConfig,
    rx: mpsc::Receiver<SinkRecord>,
) -> Result<JoinHandle<WriterSummary>, SinkError> {
    std::fs::create_dir_all(&config.data_dir).map_err(|source| SinkError::Io {
        path: config.data_dir.display().to_string(),
        source,
    })?;
    let timing = CsvBuffer::create(&config.timing_file, TIMING_HEADER)?;

    let mut writer = CsvWriter {
        data_dir: config.data_dir.clone(),
        timing,
        instruments: HashMap::new(),
        flush_every: config.flush_every,
        summary: WriterSummary::default(),
    };
    let core_id = config.core_id;
    let flush_interval = config.flush_interval;

    std::thread::Builder::new()
        .name("csv-writer".to_string())
        .spawn(move || {
            // Core dedicado para I/O (se disponível)
            if set_cpu_affinity(core_id) {
                tracing::info!(core_id, "thread de I/O presa ao core");
            } else {
                tracing::info!("CPU affinity não disponível (usando core padrão)");
            }
            // Prioridade menor: não interfere na coleta
            if set_thread_priority(10) {
                tracing::debug!("prioridade da thread de I/O definida (10)");
            }

            // Flush por tempo também: com o feed parado só chegam ~17 linhas/min
            let mut last_flush = Instant::now();
            loop {
                match rx.recv_timeout(flush_interval) {
                    Ok(record) => writer.handle(record),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
                if last_flush.elapsed() >= flush_interval {
                    writer.flush_all();
                    last_flush = Instant::now();
                }
            }

            writer.flush_all();
            tracing::info!(
                written = writer.summary.written,
                dropped = writer.summary.dropped,
                "CSV writer finalizado"
            );
            writer.summary
        })
        .map_err(|source| SinkError::Io {
            path: "csv-writer".to_string(),
            source,
        })
}
