//! Erros do núcleo e dos adaptadores

use thiserror::Error;

/// Falhas locais de ingestão. Nenhuma delas é fatal: o trade é descartado,
/// contabilizado e o fluxo continua.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IngestError {
    #[error("buffer de trades cheio para {instrument} (capacidade {capacity})")]
    BufferFull { instrument: String, capacity: usize },

    #[error("limite de {limit} instrumentos atingido, descartando {instrument}")]
    TooManyInstruments { instrument: String, limit: usize },

    #[error("evento de trade malformado: {0}")]
    MalformedTradeEvent(String),

    #[error("ingestão encerrada (cancelamento)")]
    Cancelled,
}

/// Falhas de decodificação do payload do feed.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("JSON inválido: {0}")]
    Json(#[from] serde_json::Error),

    #[error("campo ausente: {0}")]
    MissingField(&'static str),

    #[error("número inválido em {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("erro de I/O em {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
