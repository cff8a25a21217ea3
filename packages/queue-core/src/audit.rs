//! Trilha de auditoria das filas
//!
//! Grava registros imutáveis de cada mudança de estado, sempre dentro da
//! transação do chamador: mutação e log confirmam ou desfazem juntos.
//! Registros nunca são atualizados nem removidos.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::error::QueueError;
use crate::models::{LogAction, QueueLog, QueueStatus};

/// Insere um registro de auditoria na transação do chamador.
///
/// Nunca é repetido nem agrupado de forma independente — quem decide o
/// destino da escrita é o commit ou rollback da transação externa.
#[allow(clippy::too_many_arguments)]
pub async fn record(
    conn: &mut SqliteConnection,
    queue_entry_id: Uuid,
    action: LogAction,
    old_status: Option<QueueStatus>,
    new_status: QueueStatus,
    remarks: Option<&str>,
    performed_by: Option<&str>,
    details: Option<&serde_json::Value>,
) -> Result<(), QueueError> {
    sqlx::query(
        "INSERT INTO queue_logs \
         (id, queue_entry_id, action, old_status, new_status, remarks, performed_by, details, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(queue_entry_id)
    .bind(action.as_str())
    .bind(old_status.map(|s| s.as_str()))
    .bind(new_status.as_str())
    .bind(remarks)
    .bind(performed_by)
    .bind(details.map(|d| d.to_string()))
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Histórico de auditoria de uma senha, na ordem em que foi gravado
pub async fn logs_for_entry(
    pool: &SqlitePool,
    queue_entry_id: Uuid,
) -> Result<Vec<QueueLog>, QueueError> {
    let logs = sqlx::query_as::<_, QueueLog>(
        "SELECT id, queue_entry_id, action, old_status, new_status, remarks, \
                performed_by, details, created_at \
         FROM queue_logs WHERE queue_entry_id = ? ORDER BY rowid",
    )
    .bind(queue_entry_id)
    .fetch_all(pool)
    .await?;

    Ok(logs)
}
