//! Análise em tempo real de tickers da OKX
//!
//! Recebe trades pelo WebSocket público da OKX, mantém uma janela deslizante
//! de 15 minutos por instrumento e, a cada virada de minuto:
//!
//! 1. compacta a janela e calcula média móvel, volume total e atraso médio;
//! 2. em paralelo, procura para cada instrumento o par com maior correlação
//!    de Pearson entre os últimos 8 minutos de médias móveis.
//!
//! Tudo é gravado em CSVs por instrumento por uma thread de I/O dedicada,
//! fora do hot path.
//!
//! Caminho dos dados:
//!
//! ```text
//! feed ──on_trade──▶ InstrumentTable (lock) ──▶ RecordSink ──channel──▶ csv_writer
//!                          ▲   │
//!      MinuteScheduler ────┘   └─snapshot──▶ correlation (sem lock) ──apply──▶ tabela
//! ```

pub mod config;
pub mod correlation;
pub mod cpu_affinity;
pub mod csv_buffer;
pub mod csv_writer;
pub mod error;
pub mod extract;
pub mod feed;
pub mod history;
pub mod ingest;
pub mod scheduler;
pub mod sink;
pub mod table;
pub mod types;
pub mod window;

pub use error::IngestError;
pub use ingest::{FeedListener, Ingestor};
pub use scheduler::MinuteScheduler;
pub use sink::{ChannelSink, MemorySink, RecordSink};
pub use table::{InstrumentTable, TableLimits};
pub use types::{Correlation, CorrelationResult, MaEntry, SinkRecord, Trade};
