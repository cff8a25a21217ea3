//! Máquina de estados das senhas de atendimento
//!
//! Este módulo valida e aplica as transições de status de uma senha,
//! incluindo as regras de carimbo de tempo de cada transição. A tabela de
//! transições é fechada: qualquer aresta fora dela é rejeitada.

use chrono::{DateTime, Utc};

use crate::error::QueueError;
use crate::models::{QueueEntry, QueueStatus};

/// Próximos status permitidos a partir de cada status atual.
///
/// `done` e `cancelled` não têm saída por aqui; `skipped`, `cancelled` e
/// `no_show` só retornam à fila pela reintegração, que aloca nova senha
/// (ver o gerenciador de ciclo de vida).
pub fn allowed_transitions(from: QueueStatus) -> &'static [QueueStatus] {
    match from {
        QueueStatus::Waiting => &[
            QueueStatus::InProgress,
            QueueStatus::Skipped,
            QueueStatus::Cancelled,
            QueueStatus::NoShow,
        ],
        QueueStatus::InProgress => &[
            QueueStatus::Done,
            QueueStatus::Skipped,
            QueueStatus::Cancelled,
        ],
        QueueStatus::Skipped => &[QueueStatus::Waiting, QueueStatus::Cancelled],
        QueueStatus::NoShow => &[QueueStatus::Waiting],
        QueueStatus::Done => &[],
        QueueStatus::Cancelled => &[],
    }
}

/// Valida uma transição contra a tabela de arestas permitidas
pub fn validate(from: QueueStatus, to: QueueStatus) -> Result<(), QueueError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(QueueError::InvalidTransition { from, to })
    }
}

/// Minutos arredondados entre dois instantes, nunca negativos
pub fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let seconds = (end - start).num_seconds().max(0);
    (seconds + 30) / 60
}

/// Aplica uma transição validada sobre o snapshot em memória da senha.
///
/// Regras de carimbo de tempo:
/// - `waiting -> in_progress`: grava `time_started` e deriva `waiting_time`
/// - entrada em `done`, `cancelled` ou `no_show`: grava `time_completed` e
///   deriva `turnaround_time`, somente se ainda não derivado
/// - demais transições: apenas status e `updated_at`
pub fn apply(
    entry: &mut QueueEntry,
    new_status: QueueStatus,
    now: DateTime<Utc>,
) -> Result<(), QueueError> {
    validate(entry.status, new_status)?;

    match (entry.status, new_status) {
        (QueueStatus::Waiting, QueueStatus::InProgress) => {
            entry.time_started = Some(now);
            entry.waiting_time = Some(minutes_between(entry.time_in, now));
        }
        (_, QueueStatus::Done | QueueStatus::Cancelled | QueueStatus::NoShow) => {
            entry.time_completed = Some(now);
            if entry.turnaround_time.is_none() {
                entry.turnaround_time = Some(minutes_between(entry.time_in, now));
            }
        }
        _ => {}
    }

    entry.status = new_status;
    entry.updated_at = now;
    Ok(())
}
