//! Ordenação por prioridade e estimativa de espera
//!
//! Funções puras sobre um snapshot de senhas ativas (aguardando ou em
//! atendimento) de um mesmo balde. Nenhum acesso a banco acontece aqui;
//! o gerenciador fornece o snapshot.

use crate::models::{QueueEntry, QueueStatus};

/// Ordena o snapshot pela ordem de atendimento.
///
/// Chave: nível de prioridade (emergência primeiro), depois `time_in`
/// crescente (FIFO estrito dentro do mesmo nível). A ordenação é estável,
/// então empates de `time_in` preservam a ordem de busca original.
pub fn rank(entries: &[QueueEntry]) -> Vec<QueueEntry> {
    let mut ranked = entries.to_vec();
    ranked.sort_by_key(|e| (e.priority_level.tier(), e.time_in));
    ranked
}

/// Estimativa de espera em minutos para uma senha.
///
/// Zero se já está em atendimento. Caso contrário, conta as senhas à frente
/// na ordem de atendimento com nível de prioridade menor ou igual e
/// multiplica pelo tempo médio configurado por paciente. Heurística
/// deliberadamente simples, não um modelo preditivo.
pub fn estimate_wait(
    entry: &QueueEntry,
    ranked: &[QueueEntry],
    avg_service_minutes: i64,
) -> i64 {
    if entry.status == QueueStatus::InProgress {
        return 0;
    }

    let tier = entry.priority_level.tier();
    let ahead = ranked
        .iter()
        .take_while(|e| e.id != entry.id)
        .filter(|e| e.priority_level.tier() <= tier)
        .count() as i64;

    ahead * avg_service_minutes
}
