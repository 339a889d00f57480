//! Coletor OKX - médias móveis e correlações por minuto
//!
//! Este programa conecta ao WebSocket público da OKX, recebe tickers de 8
//! pares em tempo real e, a cada minuto, grava média móvel de 15 minutos,
//! volume, atraso de processamento e o par mais correlacionado.
//!
//! OTIMIZAÇÕES DE PERFORMANCE:
//! - I/O em thread separada com CPU affinity (fora do hot path)
//! - Correlação calculada sobre cópias, fora do lock da tabela
//! - Agendador ressincroniza com o relógio a cada minuto (sem deriva)
//!
//! Uso:
//!   ./target/release/okx-trades
//!   RUST_LOG=debug DATA_DIR=out SYMBOLS=BTC-USDT,ETH-USDT ./target/release/okx-trades

use anyhow::{bail, Context, Result};
use okx_trades::config::Config;
use okx_trades::csv_writer::{spawn_csv_writer, WriterConfig, FLUSH_INTERVAL};
use okx_trades::feed::{run_feed, FeedConfig};
use okx_trades::{ChannelSink, Ingestor, InstrumentTable, MinuteScheduler, RecordSink, TableLimits};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ========================================================================
    // Configuração via Variáveis de Ambiente
    // ========================================================================

    let config = Config::from_env();
    if config.symbols.is_empty() {
        bail!("SYMBOLS vazio: nada para acompanhar");
    }
    tracing::info!(
        url = %config.feed_url,
        symbols = %config.symbols.join(","),
        data_dir = %config.data_dir.display(),
        "configuração carregada"
    );

    // ========================================================================
    // Setup de I/O em Thread Separada (falha aqui aborta o processo)
    // ========================================================================

    let (tx, rx) = mpsc::channel();
    let writer = spawn_csv_writer(
        WriterConfig {
            data_dir: config.data_dir.clone(),
            timing_file: config.timing_file.clone(),
            flush_every: config.flush_every,
            flush_interval: FLUSH_INTERVAL,
            core_id: config.writer_core,
        },
        rx,
    )
    .context("não foi possível iniciar a thread de I/O")?;

    let channel_sink = Arc::new(ChannelSink::new(tx));
    let sink: Arc<dyn RecordSink> = channel_sink.clone();
    let table = Arc::new(InstrumentTable::new(
        TableLimits {
            trade_capacity: config.trade_buffer_size,
            ..TableLimits::default()
        },
        sink.clone(),
    ));

    let cancel = CancellationToken::new();
    let ingestor = Arc::new(Ingestor::new(table.clone(), cancel.clone()));

    // ========================================================================
    // Agendador por minuto e feed
    // ========================================================================

    let scheduler = MinuteScheduler::new(table.clone(), sink.clone(), cancel.clone());
    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    let feed_config = FeedConfig {
        url: config.feed_url.clone(),
        symbols: config.symbols.clone(),
        reconnect: Duration::from_secs(config.reconnect_secs),
        ping: Duration::from_secs(config.ping_secs),
    };
    let feed_ingestor = ingestor.clone();
    let feed_cancel = cancel.clone();
    let feed_task = tokio::spawn(async move {
        run_feed(&feed_config, feed_ingestor.as_ref(), feed_cancel).await;
    });

    tokio::signal::ctrl_c()
        .await
        .context("falha ao aguardar Ctrl+C")?;
    tracing::info!("Ctrl+C recebido, encerrando");
    cancel.cancel();

    // ========================================================================
    // Finalização
    // ========================================================================

    if let Err(e) = feed_task.await {
        tracing::error!(error = %e, "tarefa do feed terminou com erro");
    }
    let cycles = match scheduler_task.await {
        Ok(cycles) => cycles,
        Err(e) => {
            tracing::error!(error = %e, "agendador terminou com erro");
            0
        }
    };

    let table_stats = table.stats();
    let ingest_stats = ingestor.stats();
    let lost_in_channel = channel_sink.dropped();

    // Fecha o channel (todos os Senders) para a thread de I/O terminar
    drop(ingestor);
    drop(table);
    drop(sink);
    drop(channel_sink);
    let summary = writer
        .join()
        .map_err(|_| anyhow::anyhow!("thread de I/O entrou em pânico"))?;

    tracing::info!(
        cycles,
        accepted = table_stats.accepted,
        buffer_full = table_stats.buffer_full,
        too_many_instruments = table_stats.too_many_instruments,
        malformed = ingest_stats.malformed,
        disconnects = ingest_stats.disconnects,
        lost_in_channel,
        written = summary.written,
        dropped = summary.dropped,
        "=== Coleta Finalizada ==="
    );
    Ok(())
}
