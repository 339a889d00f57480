//! Buffer pré-alocado por arquivo CSV

use crate::error::SinkError;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Tamanho a partir do qual o buffer é descarregado sozinho (64KB).
pub const FLUSH_BYTES: usize = 64 * 1024;

/// Um arquivo CSV com buffer em memória.
///
/// Escrever no buffer é só cópia de memória; o disco só é tocado em
/// `flush` (ou quando o buffer passa de `FLUSH_BYTES`). O arquivo é truncado
/// na abertura e recebe o cabeçalho imediatamente.
pub struct CsvBuffer {
    path: PathBuf,
    buffer: Vec<u8>,
    file: File,
}

impl CsvBuffer {
    pub fn create(path: &Path, header: &str) -> Result<Self, SinkError> {
        let io_err = |source| SinkError::Io {
            path: path.display().to_string(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(io_err)?;
        writeln!(file, "{header}").map_err(io_err)?;
        file.flush().map_err(io_err)?;

        Ok(Self {
            path: path.to_path_buf(),
            buffer: Vec::with_capacity(FLUSH_BYTES),
            file,
        })
    }

    /// Adiciona uma linha (sem `\n`) ao buffer.
    pub fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        self.buffer.extend_from_slice(line.as_bytes());
        self.buffer.push(b'\n');
        if self.buffer.len() >= FLUSH_BYTES {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SinkError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let result = self
            .file
            .write_all(&self.buffer)
            .and_then(|_| self.file.flush());
        self.buffer.clear();
        result.map_err(|source| SinkError::Io {
            path: self.path.display().to_string(),
            source,
        })
    }

}

impl Drop for CsvBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::error!(error = %e, "falha no flush final do CSV");
        }
    }
}
