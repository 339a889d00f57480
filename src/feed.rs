//! Adaptador do feed: WebSocket público da OKX (canal `tickers`)
//!
//! Conecta, inscreve os símbolos e entrega cada ticker decodificado ao
//! `FeedListener`. Quando a conexão cai, espera `reconnect` e tenta de novo.
//! Não há backfill: o intervalo sem conexão simplesmente fica ausente da janela.

use crate::extract::{decode_message, subscribe_message, FeedMessage};
use crate::ingest::FeedListener;
use crate::types::now_secs;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub url: String,
    pub symbols: Vec<String>,
    pub reconnect: Duration,
    pub ping: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Closed,
    Cancelled,
}

/// Processa um frame de texto. Retorna quantos trades foram aceitos.
///
/// `received_at` deve ser capturado assim que o frame chega, antes de
/// qualquer parsing.
pub fn handle_text<L: FeedListener + ?Sized>(text: &str, received_at: f64, listener: &L) -> usize {
    let tickers = match decode_message(text) {
        Ok(FeedMessage::Tickers(tickers)) => tickers,
        Ok(FeedMessage::Event { event, detail }) => {
            if event == "error" {
                tracing::warn!(detail = detail.as_deref().unwrap_or(""), "erro reportado pela OKX");
            } else {
                tracing::debug!(event = %event, "evento de controle");
            }
            return 0;
        }
        Ok(FeedMessage::Pong) => return 0,
        Err(e) => {
            listener.on_malformed(&e.to_string());
            return 0;
        }
    };

    let mut accepted = 0;
    for raw in &tickers {
        let event = match raw.to_event() {
            Ok(event) => event,
            Err(e) => {
                listener.on_malformed(&e.to_string());
                continue;
            }
        };
        tracing::trace!(
            instrument = %event.instrument,
            price = event.price,
            volume = event.volume,
            "atualização de preço"
        );
        if listener
            .on_trade(&event.instrument, event.price, event.volume, received_at)
            .is_ok()
        {
            accepted += 1;
        }
    }
    accepted
}

/// Loop de conexão/reconexão até o cancelamento.
pub async fn run_feed<L: FeedListener + ?Sized>(
    config: &FeedConfig,
    listener: &L,
    cancel: CancellationToken,
) {
    let mut attempt = 0u64;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        attempt += 1;
        tracing::info!(attempt, url = %config.url, "conectando ao feed");

        let connected = tokio::select! {
            _ = cancel.cancelled() => break,
            result = connect_async(config.url.as_str()) => result,
        };

        match connected {
            Ok((ws, response)) => {
                tracing::info!(attempt, status = %response.status(), "conectado à OKX");
                listener.on_connectivity_change(true);
                let end = session(ws, config, listener, &cancel).await;
                listener.on_connectivity_change(false);
                if end == SessionEnd::Cancelled {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "falha ao conectar");
                listener.on_connectivity_change(false);
            }
        }

        tracing::info!(secs = config.reconnect.as_secs(), "tentando reconectar em breve");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.reconnect) => {}
        }
    }

    tracing::info!("feed encerrado");
}

async fn session<L: FeedListener + ?Sized>(
    ws: WsStream,
    config: &FeedConfig,
    listener: &L,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (mut write, mut read) = ws.split();

    let subscribe = subscribe_message(&config.symbols);
    if let Err(e) = write.send(Message::Text(subscribe)).await {
        tracing::warn!(error = %e, "falha ao enviar inscrição");
        return SessionEnd::Closed;
    }
    tracing::info!(symbols = config.symbols.len(), "inscrição enviada");

    let mut ping = tokio::time::interval(config.ping);
    ping.tick().await; // arma

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return SessionEnd::Cancelled;
            }
            _ = ping.tick() => {
                // Keep-alive textual exigido pela OKX (~30s sem tráfego derruba)
                if let Err(e) = write.send(Message::Text("ping".to_string())).await {
                    tracing::warn!(error = %e, "falha no ping");
                    return SessionEnd::Closed;
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        // Captura o recebimento IMEDIATAMENTE
                        let received_at = now_secs();
                        handle_text(&text, received_at, listener);
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = write.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let detail = frame
                            .map(|f| format!("code={:?} reason={}", f.code, f.reason))
                            .unwrap_or_else(|| "sem frame".to_string());
                        tracing::warn!(detail = %detail, "OKX fechou a conexão");
                        return SessionEnd::Closed;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "erro de leitura no WebSocket");
                        return SessionEnd::Closed;
                    }
                    None => return SessionEnd::Closed,
                }
            }
        }
    }
}
