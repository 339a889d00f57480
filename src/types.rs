//! Tipos e estruturas de dados

use std::time::{SystemTime, UNIX_EPOCH};

/// Janela deslizante de retenção de trades (15 minutos, em segundos).
pub const WINDOW_SECS: f64 = 15.0 * 60.0;

/// Capacidade padrão do buffer de trades por instrumento.
pub const TRADE_BUFFER_SIZE: usize = 100_000;

/// Número de médias móveis mantidas por instrumento (uma por minuto).
pub const MA_HISTORY_SIZE: usize = 8;

/// Limite de instrumentos acompanhados simultaneamente.
pub const MAX_INSTRUMENTS: usize = 8;

/// Símbolo sentinela usado quando não há correlação definida.
pub const NO_PEER: &str = "N/A";

/// Relógio de parede em segundos desde a época, com precisão de nanossegundos.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Trade registrado na janela de um instrumento. Imutável após inserção.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trade {
    pub timestamp: f64,        // Recebimento (segundos desde a época)
    pub price: f64,
    pub volume: f64,
    pub processing_delay: f64, // processed_at - received_at
}

/// Resumo de um minuto calculado a partir da janela de 15 minutos.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MaEntry {
    pub timestamp: f64,
    pub moving_avg: f64,
    pub total_volume: f64,
    pub avg_delay: f64,
}

/// Resultado da busca pelo par mais correlacionado.
///
/// `Undefined` não é erro: significa variância nula, pares insuficientes
/// ou nenhum par com coeficiente definido.
#[derive(Debug, Clone, PartialEq)]
pub enum Correlation {
    Undefined,
    Defined {
        peer: String,
        coefficient: f64,
        /// Timestamp da amostra (minuto) que mais contribuiu para o coeficiente.
        sample_timestamp: f64,
    },
}

impl Correlation {
    pub fn peer(&self) -> &str {
        match self {
            Correlation::Undefined => NO_PEER,
            Correlation::Defined { peer, .. } => peer,
        }
    }

    pub fn coefficient(&self) -> Option<f64> {
        match self {
            Correlation::Undefined => None,
            Correlation::Defined { coefficient, .. } => Some(*coefficient),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationResult {
    pub computed_at: f64,
    pub correlation: Correlation,
}

impl Default for CorrelationResult {
    fn default() -> Self {
        Self {
            computed_at: 0.0,
            correlation: Correlation::Undefined,
        }
    }
}

/// Ticker já decodificado, entregue pelo adaptador do feed.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerEvent {
    pub instrument: String,
    pub price: f64,
    pub volume: f64,
}

/// Registro enviado para a thread de I/O.
///
/// Cada instrumento tem três fluxos independentes (transações, médias
/// móveis, correlações); `Timing` vai para o log global do agendador.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkRecord {
    Transaction {
        instrument: String,
        trade: Trade,
    },
    MovingAverage {
        instrument: String,
        entry: MaEntry,
    },
    Correlation {
        instrument: String,
        result: CorrelationResult,
    },
    Timing {
        timestamp: f64,
        jitter: f64,
    },
}

impl SinkRecord {
    pub fn instrument(&self) -> Option<&str> {
        match self {
            SinkRecord::Transaction { instrument, .. }
            | SinkRecord::MovingAverage { instrument, .. }
            | SinkRecord::Correlation { instrument, .. } => Some(instrument),
            SinkRecord::Timing { .. } => None,
        }
    }
}
