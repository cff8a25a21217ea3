//! Alocação de números de senha
//!
//! Calcula o próximo número sequencial dentro do balde
//! (serviço, tipo de fila, dia-calendário).

use chrono::NaiveDate;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::QueueError;

/// Próximo número de senha no balde, começando em 1.
///
/// Lê o máximo e deixa a inserção para o chamador, dentro da mesma
/// transação. Duas transações concorrentes podem ler o mesmo máximo; o
/// índice único sobre (service_id, queue_type, queue_day, queue_number)
/// rejeita a segunda inserção, que chega ao chamador como `Conflict`.
pub async fn next_number(
    conn: &mut SqliteConnection,
    service_id: Uuid,
    queue_type: &str,
    day: NaiveDate,
) -> Result<i64, QueueError> {
    let next: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(queue_number), 0) + 1 FROM queue_entries \
         WHERE service_id = ? AND queue_type = ? AND queue_day = ?",
    )
    .bind(service_id)
    .bind(queue_type)
    .bind(day)
    .fetch_one(&mut *conn)
    .await?;

    Ok(next)
}
