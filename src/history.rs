//! Histórico de médias móveis (anel de 8 minutos)

use crate::types::{MaEntry, MA_HISTORY_SIZE};
use std::collections::VecDeque;

/// Anel de capacidade fixa: quando cheio, o mais antigo sai a cada inserção.
#[derive(Debug, Clone, Default)]
pub struct MaHistory {
    entries: VecDeque<MaEntry>,
}

impl MaHistory {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(MA_HISTORY_SIZE),
        }
    }

    pub fn push(&mut self, entry: MaEntry) {
        if self.entries.len() == MA_HISTORY_SIZE {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == MA_HISTORY_SIZE
    }

    /// Cópia das 8 entradas, do mais antigo ao mais recente. `None` se incompleto.
    pub fn full_window(&self) -> Option<[MaEntry; MA_HISTORY_SIZE]> {
        if !self.is_full() {
            return None;
        }
        let mut out = [MaEntry::default(); MA_HISTORY_SIZE];
        for (slot, entry) in out.iter_mut().zip(self.entries.iter()) {
            *slot = *entry;
        }
        Some(out)
    }
}
