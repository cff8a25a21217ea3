//! Definições de erro para a biblioteca queue-core
//!
//! Este módulo define os tipos de erro usados pelas operações da fila

use thiserror::Error;

use crate::models::QueueStatus;

/// Erros específicos das operações da fila de atendimento
#[derive(Error, Debug)]
pub enum QueueError {
    /// Consulta, visita ou senha referenciada não existe
    #[error("Registro não encontrado: {0}")]
    NotFound(String),

    /// Mudança de status fora da tabela de transições permitidas
    #[error("Transição de status inválida: {from} -> {to}")]
    InvalidTransition {
        from: QueueStatus,
        to: QueueStatus,
    },

    /// Pedido estruturalmente válido, mas proibido por regra de negócio
    #[error("Operação inválida: {0}")]
    InvalidOperation(String),

    /// Corrida detectada na alocação de senha (índice único ou escritor concorrente)
    #[error("Conflito na alocação de senha: {0}")]
    Conflict(String),

    #[error("Erro de banco de dados: {0}")]
    Database(String),

    #[error("Erro interno: {0}")]
    Internal(String),
}

/// Conversão de erros específicos do SQLx para nossos tipos de erro
impl From<sqlx::Error> for QueueError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => QueueError::NotFound("Registro não encontrado".to_string()),
            sqlx::Error::Database(dbe) => {
                if let Some(code) = dbe.code() {
                    // 2067/1555/23000: violação de índice único — outra transação
                    // alocou o mesmo número de senha no mesmo balde.
                    // 5/517: SQLITE_BUSY / SQLITE_BUSY_SNAPSHOT — um escritor
                    // concorrente venceu a corrida antes desta transação gravar.
                    match code.as_ref() {
                        "2067" | "1555" | "23000" | "5" | "517" => {
                            return QueueError::Conflict(dbe.message().to_string());
                        }
                        _ => {}
                    }
                }
                QueueError::Database(dbe.message().to_string())
            }
            sqlx::Error::ColumnNotFound(col) =>
                QueueError::Database(format!("Coluna não encontrada: {}", col)),
            sqlx::Error::ColumnDecode { index, source } =>
                QueueError::Database(format!("Erro ao decodificar coluna {}: {}", index, source)),
            sqlx::Error::Io(io_err) =>
                QueueError::Database(io_err.to_string()),
            sqlx::Error::PoolClosed =>
                QueueError::Database("Pool de conexões fechado".to_string()),
            sqlx::Error::PoolTimedOut =>
                QueueError::Database("Timeout no pool de conexões".to_string()),
            _ => QueueError::Internal(format!("Erro inesperado: {:?}", error)),
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(error: serde_json::Error) -> Self {
        QueueError::Internal(format!("Erro de serialização: {}", error))
    }
}
