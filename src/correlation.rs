//! Correlação de Pearson entre históricos de médias móveis
//!
//! Cada instrumento com anel completo ganha uma tarefa própria que procura o
//! par mais correlacionado. As tarefas leem apenas o snapshot imutável (nunca
//! a tabela viva) e não precisam de sincronização entre si. O chamador aguarda
//! todas antes do próximo ciclo.

use crate::table::SnapshotEntry;
use crate::types::{Correlation, CorrelationResult, MA_HISTORY_SIZE};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Coeficiente de Pearson entre dois vetores de mesmo tamanho.
///
/// `None` quando `n < 2`, quando os tamanhos diferem ou quando algum vetor
/// tem variância zero. Nunca retorna NaN.
pub fn pearson(v1: &[f64], v2: &[f64]) -> Option<f64> {
    let n = v1.len();
    if n < 2 || n != v2.len() {
        return None;
    }

    let mean1 = v1.iter().sum::<f64>() / n as f64;
    let mean2 = v2.iter().sum::<f64>() / n as f64;

    let mut num = 0.0;
    let mut den1 = 0.0;
    let mut den2 = 0.0;
    for (a, b) in v1.iter().zip(v2) {
        let d1 = a - mean1;
        let d2 = b - mean2;
        num += d1 * d2;
        den1 += d1 * d1;
        den2 += d2 * d2;
    }

    if den1 == 0.0 || den2 == 0.0 {
        return None;
    }
    let r = num / (den1 * den2).sqrt();
    if r.is_nan() {
        return None;
    }
    Some(r.clamp(-1.0, 1.0))
}

/// Índice da amostra com maior |(a[k]-média_a)(b[k]-média_b)|.
///
/// Empate: o primeiro índice vence.
fn dominant_sample(a: &[f64; MA_HISTORY_SIZE], b: &[f64; MA_HISTORY_SIZE]) -> usize {
    let mean_a = a.iter().sum::<f64>() / MA_HISTORY_SIZE as f64;
    let mean_b = b.iter().sum::<f64>() / MA_HISTORY_SIZE as f64;

    let mut best = 0;
    let mut best_contrib = -1.0;
    for k in 0..MA_HISTORY_SIZE {
        let contrib = ((a[k] - mean_a) * (b[k] - mean_b)).abs();
        if contrib > best_contrib {
            best_contrib = contrib;
            best = k;
        }
    }
    best
}

/// Melhor par para `snapshot[idx]`.
///
/// Percorre os demais instrumentos na ordem do snapshot; empates ficam com o
/// primeiro encontrado. Correlações indefinidas são ignoradas.
pub fn best_correlation(idx: usize, snapshot: &[SnapshotEntry], computed_at: f64) -> CorrelationResult {
    let Some(own) = snapshot.get(idx) else {
        return CorrelationResult {
            computed_at,
            correlation: Correlation::Undefined,
        };
    };
    let own_values = own.ma_values();

    let mut best: Option<(usize, f64)> = None;
    for (j, other) in snapshot.iter().enumerate() {
        if j == idx {
            continue;
        }
        let Some(r) = pearson(&own_values, &other.ma_values()) else {
            continue;
        };
        if best.map_or(true, |(_, max)| r > max) {
            best = Some((j, r));
        }
    }

    let correlation = match best {
        None => Correlation::Undefined,
        Some((j, coefficient)) => {
            let peer = &snapshot[j];
            let k = dominant_sample(&own_values, &peer.ma_values());
            Correlation::Defined {
                peer: peer.symbol.clone(),
                coefficient,
                sample_timestamp: own.history[k].timestamp,
            }
        }
    };

    CorrelationResult {
        computed_at,
        correlation,
    }
}

/// Fan-out/fan-in: uma tarefa bloqueante por instrumento, todas aguardadas.
///
/// Retorna `(table_index, resultado)` na ordem do snapshot. Com menos de dois
/// instrumentos não há o que comparar e nada é calculado.
pub async fn run_correlation_pass(
    snapshot: Vec<SnapshotEntry>,
    computed_at: f64,
) -> Vec<(usize, CorrelationResult)> {
    if snapshot.len() < 2 {
        return Vec::new();
    }

    let snapshot: Arc<[SnapshotEntry]> = snapshot.into();
    let mut tasks = JoinSet::new();
    for idx in 0..snapshot.len() {
        let data = Arc::clone(&snapshot);
        tasks.spawn_blocking(move || {
            let result = best_correlation(idx, &data, computed_at);
            (idx, data[idx].table_index, result)
        });
    }

    let mut results = Vec::with_capacity(snapshot.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(entry) => results.push(entry),
            Err(e) => tracing::error!(error = %e, "tarefa de correlação falhou"),
        }
    }

    results.sort_by_key(|(idx, _, _)| *idx);
    results
        .into_iter()
        .map(|(_, table_index, result)| (table_index, result))
        .collect()
}
