//! Gerenciador de ciclo de vida das senhas de atendimento
//!
//! Orquestra as quatro operações da fila: criação, avanço de status,
//! remanejamento entre serviços e reintegração de senhas abandonadas.
//! Cada operação é uma única transação: ler estado, validar, gravar
//! estado e gravar auditoria — tudo confirma ou desfaz junto.

use std::sync::Arc;

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::allocator;
use crate::audit;
use crate::error::QueueError;
use crate::estimator;
use crate::lookup::VisitLookup;
use crate::models::{LogAction, MovedDetails, PriorityLevel, QueueEntry, QueueStatus};
use crate::transitions;
use crate::QueueConfig;

/// Ponto único de mutação das filas de atendimento.
///
/// Nenhum outro componente escreve em `queue_entries` ou `queue_logs`.
#[derive(Clone)]
pub struct QueueManager {
    pool: SqlitePool,
    lookup: Arc<dyn VisitLookup>,
    config: QueueConfig,
}

impl QueueManager {
    pub fn new(pool: SqlitePool, lookup: Arc<dyn VisitLookup>, config: QueueConfig) -> Self {
        Self {
            pool,
            lookup,
            config,
        }
    }

    /// Cria uma senha para uma consulta já convertida em visita.
    ///
    /// Aloca o próximo número no balde (serviço, tipo de fila, hoje), insere
    /// a senha em `waiting` e grava o log `created`, tudo em uma transação.
    /// Consulta sem visita associada falha com `NotFound`. Um conflito de
    /// alocação é repetido uma única vez antes de ser propagado.
    pub async fn create_entry(
        &self,
        appointment_id: Uuid,
        patient_id: Uuid,
        service_id: Uuid,
        queue_type: &str,
        priority_level: PriorityLevel,
        performed_by: Option<&str>,
    ) -> Result<QueueEntry, QueueError> {
        let visit_id = self
            .lookup
            .visit_for_appointment(appointment_id)
            .await?
            .ok_or_else(|| {
                QueueError::NotFound(format!(
                    "Consulta {} não possui visita associada",
                    appointment_id
                ))
            })?;

        let mut retried = false;
        loop {
            match self
                .try_create(
                    visit_id,
                    appointment_id,
                    patient_id,
                    service_id,
                    queue_type,
                    priority_level,
                    performed_by,
                )
                .await
            {
                Err(QueueError::Conflict(msg)) if !retried => {
                    warn!("Conflito na alocação de senha, repetindo: {}", msg);
                    retried = true;
                }
                other => return other,
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn try_create(
        &self,
        visit_id: Uuid,
        appointment_id: Uuid,
        patient_id: Uuid,
        service_id: Uuid,
        queue_type: &str,
        priority_level: PriorityLevel,
        performed_by: Option<&str>,
    ) -> Result<QueueEntry, QueueError> {
        let now = Utc::now();
        let day = now.date_naive();

        let mut tx = self.pool.begin().await?;
        let queue_number = allocator::next_number(&mut tx, service_id, queue_type, day).await?;

        let entry = QueueEntry {
            id: Uuid::new_v4(),
            visit_id,
            appointment_id,
            patient_id,
            service_id,
            queue_type: queue_type.to_string(),
            queue_day: day,
            queue_number,
            priority_level,
            status: QueueStatus::Waiting,
            time_in: now,
            time_started: None,
            time_completed: None,
            waiting_time: None,
            turnaround_time: None,
            remarks: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO queue_entries \
             (id, visit_id, appointment_id, patient_id, service_id, queue_type, queue_day, \
              queue_number, priority_level, status, time_in, time_started, time_completed, \
              waiting_time, turnaround_time, remarks, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id)
        .bind(entry.visit_id)
        .bind(entry.appointment_id)
        .bind(entry.patient_id)
        .bind(entry.service_id)
        .bind(&entry.queue_type)
        .bind(entry.queue_day)
        .bind(entry.queue_number)
        .bind(entry.priority_level.as_str())
        .bind(entry.status.as_str())
        .bind(entry.time_in)
        .bind(entry.time_started)
        .bind(entry.time_completed)
        .bind(entry.waiting_time)
        .bind(entry.turnaround_time)
        .bind(&entry.remarks)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            entry.id,
            LogAction::Created,
            None,
            QueueStatus::Waiting,
            None,
            performed_by,
            None,
        )
        .await?;

        tx.commit().await?;

        info!(
            "Senha {} criada: serviço {}, fila {}, número {}",
            entry.id, service_id, queue_type, queue_number
        );
        Ok(entry)
    }

    /// Avança o status de uma senha pela máquina de estados.
    ///
    /// Transições fora da tabela falham com `InvalidTransition` e nada é
    /// gravado. Os carimbos de tempo seguem as regras da transição.
    pub async fn advance_status(
        &self,
        queue_entry_id: Uuid,
        new_status: QueueStatus,
        performed_by: Option<&str>,
        remarks: Option<&str>,
    ) -> Result<QueueEntry, QueueError> {
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        let mut entry = fetch_entry(&mut tx, queue_entry_id).await?;
        let old_status = entry.status;

        transitions::apply(&mut entry, new_status, now)?;
        if let Some(text) = remarks {
            entry.remarks = Some(text.to_string());
        }

        persist_entry(&mut tx, &entry).await?;
        audit::record(
            &mut tx,
            entry.id,
            LogAction::StatusChanged,
            Some(old_status),
            new_status,
            remarks,
            performed_by,
            None,
        )
        .await?;

        tx.commit().await?;

        debug!(
            "Senha {}: status {} -> {}",
            queue_entry_id, old_status, new_status
        );
        Ok(entry)
    }

    /// Remaneja uma senha para outro serviço ou tipo de fila.
    ///
    /// Proibido após `done`. A senha recebe número novo no balde de destino,
    /// volta a `waiting` no fim da fila e perde todos os campos de tempo;
    /// a prioridade original é preservada. O log `moved` registra origem e
    /// destino do remanejamento.
    pub async fn reassign(
        &self,
        queue_entry_id: Uuid,
        new_service_id: Uuid,
        new_queue_type: &str,
        performed_by: Option<&str>,
    ) -> Result<QueueEntry, QueueError> {
        let mut retried = false;
        loop {
            match self
                .try_reassign(queue_entry_id, new_service_id, new_queue_type, performed_by)
                .await
            {
                Err(QueueError::Conflict(msg)) if !retried => {
                    warn!("Conflito na alocação de senha, repetindo: {}", msg);
                    retried = true;
                }
                other => return other,
            }
        }
    }

    async fn try_reassign(
        &self,
        queue_entry_id: Uuid,
        new_service_id: Uuid,
        new_queue_type: &str,
        performed_by: Option<&str>,
    ) -> Result<QueueEntry, QueueError> {
        let now = Utc::now();
        let day = now.date_naive();

        let mut tx = self.pool.begin().await?;
        let mut entry = fetch_entry(&mut tx, queue_entry_id).await?;

        if entry.status == QueueStatus::Done {
            return Err(QueueError::InvalidOperation(format!(
                "Senha {} já concluída não pode ser remanejada",
                queue_entry_id
            )));
        }

        let queue_number =
            allocator::next_number(&mut tx, new_service_id, new_queue_type, day).await?;

        let details = MovedDetails {
            from_service_id: entry.service_id,
            to_service_id: new_service_id,
            from_queue_type: entry.queue_type.clone(),
            to_queue_type: new_queue_type.to_string(),
            from_queue_number: entry.queue_number,
            to_queue_number: queue_number,
        };
        let old_status = entry.status;

        entry.service_id = new_service_id;
        entry.queue_type = new_queue_type.to_string();
        entry.queue_day = day;
        entry.queue_number = queue_number;
        reset_to_waiting(&mut entry, now);

        persist_entry(&mut tx, &entry).await?;

        let details_json = serde_json::to_value(&details)?;
        audit::record(
            &mut tx,
            entry.id,
            LogAction::Moved,
            Some(old_status),
            QueueStatus::Waiting,
            None,
            performed_by,
            Some(&details_json),
        )
        .await?;

        tx.commit().await?;

        info!(
            "Senha {} remanejada: serviço {} ({}) -> serviço {} ({}), número {}",
            queue_entry_id,
            details.from_service_id,
            details.from_queue_type,
            new_service_id,
            new_queue_type,
            queue_number
        );
        Ok(entry)
    }

    /// Reintegra uma senha pulada, cancelada ou de não comparecimento.
    ///
    /// A senha recebe número novo no balde atual e volta a `waiting` no fim
    /// da fila, com os campos de tempo limpos. Qualquer outro status falha
    /// com `InvalidOperation`.
    pub async fn reinstate(
        &self,
        queue_entry_id: Uuid,
        performed_by: Option<&str>,
        remarks: Option<&str>,
    ) -> Result<QueueEntry, QueueError> {
        let mut retried = false;
        loop {
            match self.try_reinstate(queue_entry_id, performed_by, remarks).await {
                Err(QueueError::Conflict(msg)) if !retried => {
                    warn!("Conflito na alocação de senha, repetindo: {}", msg);
                    retried = true;
                }
                other => return other,
            }
        }
    }

    async fn try_reinstate(
        &self,
        queue_entry_id: Uuid,
        performed_by: Option<&str>,
        remarks: Option<&str>,
    ) -> Result<QueueEntry, QueueError> {
        let now = Utc::now();
        let day = now.date_naive();

        let mut tx = self.pool.begin().await?;
        let mut entry = fetch_entry(&mut tx, queue_entry_id).await?;

        if !entry.status.is_recoverable() {
            return Err(QueueError::InvalidOperation(format!(
                "Senha {} em status {} não pode ser reintegrada",
                queue_entry_id, entry.status
            )));
        }

        let queue_number =
            allocator::next_number(&mut tx, entry.service_id, &entry.queue_type, day).await?;

        let old_status = entry.status;
        entry.queue_day = day;
        entry.queue_number = queue_number;
        reset_to_waiting(&mut entry, now);
        if let Some(text) = remarks {
            entry.remarks = Some(text.to_string());
        }

        persist_entry(&mut tx, &entry).await?;
        audit::record(
            &mut tx,
            entry.id,
            LogAction::Reinstated,
            Some(old_status),
            QueueStatus::Waiting,
            remarks,
            performed_by,
            None,
        )
        .await?;

        tx.commit().await?;

        info!(
            "Senha {} reintegrada com número {} (era {})",
            queue_entry_id, queue_number, old_status
        );
        Ok(entry)
    }

    /// Busca uma senha pelo identificador
    pub async fn get_entry(&self, queue_entry_id: Uuid) -> Result<QueueEntry, QueueError> {
        sqlx::query_as::<_, QueueEntry>("SELECT * FROM queue_entries WHERE id = ?")
            .bind(queue_entry_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| QueueError::NotFound(format!("Senha {} não encontrada", queue_entry_id)))
    }

    /// Snapshot das senhas ativas de um balde no dia corrente, por ordem de chegada
    pub async fn list_active(
        &self,
        service_id: Uuid,
        queue_type: &str,
    ) -> Result<Vec<QueueEntry>, QueueError> {
        let entries = sqlx::query_as::<_, QueueEntry>(
            "SELECT * FROM queue_entries \
             WHERE service_id = ? AND queue_type = ? AND queue_day = ? \
               AND status IN ('waiting', 'in_progress') \
             ORDER BY time_in",
        )
        .bind(service_id)
        .bind(queue_type)
        .bind(Utc::now().date_naive())
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Fila na ordem de atendimento, com a estimativa de espera de cada senha
    pub async fn ranked_with_wait(
        &self,
        service_id: Uuid,
        queue_type: &str,
    ) -> Result<Vec<(QueueEntry, i64)>, QueueError> {
        let active = self.list_active(service_id, queue_type).await?;
        let ranked = estimator::rank(&active);
        let result = ranked
            .iter()
            .map(|entry| {
                let wait = estimator::estimate_wait(entry, &ranked, self.config.avg_service_minutes);
                (entry.clone(), wait)
            })
            .collect();
        Ok(result)
    }
}

/// Volta a senha para o fim da fila: `waiting`, nova entrada, tempos limpos
fn reset_to_waiting(entry: &mut QueueEntry, now: chrono::DateTime<Utc>) {
    entry.status = QueueStatus::Waiting;
    entry.time_in = now;
    entry.time_started = None;
    entry.time_completed = None;
    entry.waiting_time = None;
    entry.turnaround_time = None;
    entry.updated_at = now;
}

async fn fetch_entry(
    conn: &mut SqliteConnection,
    queue_entry_id: Uuid,
) -> Result<QueueEntry, QueueError> {
    sqlx::query_as::<_, QueueEntry>("SELECT * FROM queue_entries WHERE id = ?")
        .bind(queue_entry_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| QueueError::NotFound(format!("Senha {} não encontrada", queue_entry_id)))
}

async fn persist_entry(
    conn: &mut SqliteConnection,
    entry: &QueueEntry,
) -> Result<(), QueueError> {
    sqlx::query(
        "UPDATE queue_entries SET \
         service_id = ?, queue_type = ?, queue_day = ?, queue_number = ?, status = ?, \
         time_in = ?, time_started = ?, time_completed = ?, waiting_time = ?, \
         turnaround_time = ?, remarks = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(entry.service_id)
    .bind(&entry.queue_type)
    .bind(entry.queue_day)
    .bind(entry.queue_number)
    .bind(entry.status.as_str())
    .bind(entry.time_in)
    .bind(entry.time_started)
    .bind(entry.time_completed)
    .bind(entry.waiting_time)
    .bind(entry.turnaround_time)
    .bind(&entry.remarks)
    .bind(entry.updated_at)
    .bind(entry.id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{init_db_pool, DbConfig};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tempfile::{tempdir, TempDir};

    /// Diretório de consultas conhecido pelos testes
    struct FakeVisitLookup {
        visits: HashMap<Uuid, Uuid>,
    }

    #[async_trait]
    impl VisitLookup for FakeVisitLookup {
        async fn visit_for_appointment(
            &self,
            appointment_id: Uuid,
        ) -> Result<Option<Uuid>, QueueError> {
            Ok(self.visits.get(&appointment_id).copied())
        }
    }

    struct TestContext {
        _temp: TempDir,
        pool: SqlitePool,
        manager: QueueManager,
        appointment_id: Uuid,
        visit_id: Uuid,
        patient_id: Uuid,
        service_id: Uuid,
    }

    async fn setup() -> Result<TestContext> {
        setup_with_appointments(1).await.map(|(ctx, _)| ctx)
    }

    /// Contexto com `extra` consultas adicionais já resolvíveis em visitas
    async fn setup_with_appointments(total: usize) -> Result<(TestContext, Vec<Uuid>)> {
        let temp = tempdir()?;
        let config = DbConfig {
            db_path: temp.path().join("queue.db").to_str().unwrap().to_string(),
            max_connections: 5,
            busy_timeout_secs: 5,
        };
        let pool = init_db_pool(&config).await?;

        let appointments: Vec<Uuid> = (0..total).map(|_| Uuid::new_v4()).collect();
        let mut visits = HashMap::new();
        let mut visit_ids = Vec::new();
        for appointment in &appointments {
            let visit = Uuid::new_v4();
            visits.insert(*appointment, visit);
            visit_ids.push(visit);
        }

        let manager = QueueManager::new(
            pool.clone(),
            Arc::new(FakeVisitLookup { visits }),
            QueueConfig::default(),
        );

        let ctx = TestContext {
            _temp: temp,
            pool,
            manager,
            appointment_id: appointments[0],
            visit_id: visit_ids[0],
            patient_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
        };
        Ok((ctx, appointments))
    }

    #[tokio::test]
    async fn test_create_entry_assigns_sequential_numbers() -> Result<()> {
        let (ctx, appointments) = setup_with_appointments(3).await?;

        let mut numbers = Vec::new();
        for appointment in &appointments {
            let entry = ctx
                .manager
                .create_entry(
                    *appointment,
                    Uuid::new_v4(),
                    ctx.service_id,
                    "consultation",
                    PriorityLevel::Normal,
                    Some("emp-1"),
                )
                .await?;
            assert_eq!(entry.status, QueueStatus::Waiting);
            assert!(entry.time_started.is_none());
            numbers.push(entry.queue_number);
        }

        assert_eq!(numbers, vec![1, 2, 3]);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_entry_resolves_visit() -> Result<()> {
        let ctx = setup().await?;

        let entry = ctx
            .manager
            .create_entry(
                ctx.appointment_id,
                ctx.patient_id,
                ctx.service_id,
                "triage",
                PriorityLevel::Priority,
                None,
            )
            .await?;

        assert_eq!(entry.visit_id, ctx.visit_id);
        assert_eq!(entry.appointment_id, ctx.appointment_id);
        assert_eq!(entry.priority_level, PriorityLevel::Priority);

        // Log `created` gravado na mesma transação
        let logs = audit::logs_for_entry(&ctx.pool, entry.id).await?;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, LogAction::Created);
        assert_eq!(logs[0].old_status, None);
        assert_eq!(logs[0].new_status, QueueStatus::Waiting);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_entry_unknown_appointment_fails() -> Result<()> {
        let ctx = setup().await?;

        let result = ctx
            .manager
            .create_entry(
                Uuid::new_v4(),
                ctx.patient_id,
                ctx.service_id,
                "consultation",
                PriorityLevel::Normal,
                None,
            )
            .await;

        assert!(matches!(result, Err(QueueError::NotFound(_))));

        // Nada foi alocado nem logado
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_entries")
            .fetch_one(&ctx.pool)
            .await?;
        assert_eq!(count, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_advance_status_full_cycle() -> Result<()> {
        let ctx = setup().await?;
        let entry = ctx
            .manager
            .create_entry(
                ctx.appointment_id,
                ctx.patient_id,
                ctx.service_id,
                "consultation",
                PriorityLevel::Normal,
                None,
            )
            .await?;

        let serving = ctx
            .manager
            .advance_status(entry.id, QueueStatus::InProgress, Some("emp-2"), None)
            .await?;
        assert_eq!(serving.status, QueueStatus::InProgress);
        assert!(serving.time_started.is_some());
        assert!(serving.waiting_time.unwrap() >= 0);
        assert!(serving.time_completed.is_none());

        let done = ctx
            .manager
            .advance_status(entry.id, QueueStatus::Done, Some("emp-2"), Some("atendido"))
            .await?;
        assert_eq!(done.status, QueueStatus::Done);
        assert!(done.time_completed.is_some());
        assert!(done.turnaround_time.is_some());
        assert_eq!(done.remarks.as_deref(), Some("atendido"));
        Ok(())
    }

    #[tokio::test]
    async fn test_advance_status_direct_done_fails_unchanged() -> Result<()> {
        let ctx = setup().await?;
        let entry = ctx
            .manager
            .create_entry(
                ctx.appointment_id,
                ctx.patient_id,
                ctx.service_id,
                "consultation",
                PriorityLevel::Normal,
                None,
            )
            .await?;

        // waiting -> done sem passar por in_progress
        let result = ctx
            .manager
            .advance_status(entry.id, QueueStatus::Done, None, None)
            .await;
        match result {
            Err(QueueError::InvalidTransition { from, to }) => {
                assert_eq!(from, QueueStatus::Waiting);
                assert_eq!(to, QueueStatus::Done);
            }
            other => panic!("esperava InvalidTransition, obteve {:?}", other.map(|e| e.status)),
        }

        // A senha permanece intacta e sem log adicional
        let unchanged = ctx.manager.get_entry(entry.id).await?;
        assert_eq!(unchanged.status, QueueStatus::Waiting);
        assert!(unchanged.time_completed.is_none());
        let logs = audit::logs_for_entry(&ctx.pool, entry.id).await?;
        assert_eq!(logs.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_advance_status_missing_entry_fails() -> Result<()> {
        let ctx = setup().await?;
        let result = ctx
            .manager
            .advance_status(Uuid::new_v4(), QueueStatus::InProgress, None, None)
            .await;
        assert!(matches!(result, Err(QueueError::NotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_reassign_moves_to_back_of_target_queue() -> Result<()> {
        let (ctx, appointments) = setup_with_appointments(2).await?;
        let lab_service = Uuid::new_v4();

        // Já existe uma senha na fila de destino
        ctx.manager
            .create_entry(
                appointments[1],
                Uuid::new_v4(),
                lab_service,
                "lab",
                PriorityLevel::Normal,
                None,
            )
            .await?;

        let entry = ctx
            .manager
            .create_entry(
                appointments[0],
                ctx.patient_id,
                ctx.service_id,
                "consultation",
                PriorityLevel::Priority,
                None,
            )
            .await?;
        ctx.manager
            .advance_status(entry.id, QueueStatus::InProgress, None, None)
            .await?;

        let moved = ctx
            .manager
            .reassign(entry.id, lab_service, "lab", Some("emp-3"))
            .await?;

        assert_eq!(moved.service_id, lab_service);
        assert_eq!(moved.queue_type, "lab");
        assert_eq!(moved.queue_number, 2, "entra no fim da fila de destino");
        assert_eq!(moved.status, QueueStatus::Waiting);
        assert_eq!(moved.priority_level, PriorityLevel::Priority);
        assert!(moved.time_started.is_none());
        assert!(moved.time_completed.is_none());
        assert!(moved.waiting_time.is_none());
        assert!(moved.turnaround_time.is_none());

        // O log `moved` registra origem e destino
        let logs = audit::logs_for_entry(&ctx.pool, entry.id).await?;
        let moved_log = logs.last().unwrap();
        assert_eq!(moved_log.action, LogAction::Moved);
        assert_eq!(moved_log.old_status, Some(QueueStatus::InProgress));
        assert_eq!(moved_log.new_status, QueueStatus::Waiting);
        let details: MovedDetails =
            serde_json::from_value(moved_log.details.clone().unwrap())?;
        assert_eq!(details.from_service_id, ctx.service_id);
        assert_eq!(details.to_service_id, lab_service);
        assert_eq!(details.to_queue_number, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_reassign_done_entry_fails() -> Result<()> {
        let ctx = setup().await?;
        let entry = ctx
            .manager
            .create_entry(
                ctx.appointment_id,
                ctx.patient_id,
                ctx.service_id,
                "consultation",
                PriorityLevel::Normal,
                None,
            )
            .await?;
        ctx.manager
            .advance_status(entry.id, QueueStatus::InProgress, None, None)
            .await?;
        ctx.manager
            .advance_status(entry.id, QueueStatus::Done, None, None)
            .await?;

        let result = ctx
            .manager
            .reassign(entry.id, Uuid::new_v4(), "lab", None)
            .await;
        assert!(matches!(result, Err(QueueError::InvalidOperation(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_reinstate_no_show_gets_fresh_number() -> Result<()> {
        let (ctx, appointments) = setup_with_appointments(2).await?;

        let entry = ctx
            .manager
            .create_entry(
                appointments[0],
                ctx.patient_id,
                ctx.service_id,
                "consultation",
                PriorityLevel::Normal,
                None,
            )
            .await?;
        assert_eq!(entry.queue_number, 1);

        // Outra senha ocupa o número 2 antes da reintegração
        ctx.manager
            .create_entry(
                appointments[1],
                Uuid::new_v4(),
                ctx.service_id,
                "consultation",
                PriorityLevel::Normal,
                None,
            )
            .await?;

        ctx.manager
            .advance_status(entry.id, QueueStatus::NoShow, Some("emp-4"), None)
            .await?;

        let reinstated = ctx
            .manager
            .reinstate(entry.id, Some("emp-4"), Some("paciente retornou"))
            .await?;

        assert_eq!(reinstated.status, QueueStatus::Waiting);
        assert_eq!(reinstated.queue_number, 3, "número novo, nunca o original");
        assert_eq!(reinstated.service_id, ctx.service_id);
        assert!(reinstated.time_started.is_none());
        assert!(reinstated.time_completed.is_none());
        assert!(reinstated.waiting_time.is_none());
        assert!(reinstated.turnaround_time.is_none());

        let logs = audit::logs_for_entry(&ctx.pool, entry.id).await?;
        let last = logs.last().unwrap();
        assert_eq!(last.action, LogAction::Reinstated);
        assert_eq!(last.old_status, Some(QueueStatus::NoShow));
        assert_eq!(last.new_status, QueueStatus::Waiting);
        Ok(())
    }

    #[tokio::test]
    async fn test_reinstate_waiting_entry_fails() -> Result<()> {
        let ctx = setup().await?;
        let entry = ctx
            .manager
            .create_entry(
                ctx.appointment_id,
                ctx.patient_id,
                ctx.service_id,
                "consultation",
                PriorityLevel::Normal,
                None,
            )
            .await?;

        let result = ctx.manager.reinstate(entry.id, None, None).await;
        assert!(matches!(result, Err(QueueError::InvalidOperation(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_audit_trail_is_complete() -> Result<()> {
        let ctx = setup().await?;
        let entry = ctx
            .manager
            .create_entry(
                ctx.appointment_id,
                ctx.patient_id,
                ctx.service_id,
                "consultation",
                PriorityLevel::Normal,
                Some("emp-1"),
            )
            .await?;
        ctx.manager
            .advance_status(entry.id, QueueStatus::InProgress, Some("emp-2"), None)
            .await?;
        ctx.manager
            .advance_status(entry.id, QueueStatus::Done, Some("emp-2"), None)
            .await?;

        // Exatamente um log por mutação confirmada, com os status encadeados
        let logs = audit::logs_for_entry(&ctx.pool, entry.id).await?;
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].action, LogAction::Created);
        assert_eq!(logs[1].old_status, Some(QueueStatus::Waiting));
        assert_eq!(logs[1].new_status, QueueStatus::InProgress);
        assert_eq!(logs[2].old_status, Some(QueueStatus::InProgress));
        assert_eq!(logs[2].new_status, QueueStatus::Done);
        Ok(())
    }

    #[tokio::test]
    async fn test_ranked_queue_with_waits() -> Result<()> {
        let (ctx, appointments) = setup_with_appointments(3).await?;

        // A (normal), B (prioridade), C (emergência), nessa ordem de chegada
        let a = ctx
            .manager
            .create_entry(
                appointments[0],
                Uuid::new_v4(),
                ctx.service_id,
                "consultation",
                PriorityLevel::Normal,
                None,
            )
            .await?;
        let b = ctx
            .manager
            .create_entry(
                appointments[1],
                Uuid::new_v4(),
                ctx.service_id,
                "consultation",
                PriorityLevel::Priority,
                None,
            )
            .await?;
        let c = ctx
            .manager
            .create_entry(
                appointments[2],
                Uuid::new_v4(),
                ctx.service_id,
                "consultation",
                PriorityLevel::Emergency,
                None,
            )
            .await?;

        let ranked = ctx
            .manager
            .ranked_with_wait(ctx.service_id, "consultation")
            .await?;

        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].0.id, c.id);
        assert_eq!(ranked[1].0.id, b.id);
        assert_eq!(ranked[2].0.id, a.id);
        assert_eq!(ranked[0].1, 0);
        assert_eq!(ranked[1].1, 10);
        assert_eq!(ranked[2].1, 20);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_keep_numbers_unique() -> Result<()> {
        let (ctx, appointments) = setup_with_appointments(8).await?;

        let mut handles = Vec::new();
        for appointment in appointments {
            let manager = ctx.manager.clone();
            let service_id = ctx.service_id;
            handles.push(tokio::spawn(async move {
                manager
                    .create_entry(
                        appointment,
                        Uuid::new_v4(),
                        service_id,
                        "triage",
                        PriorityLevel::Normal,
                        None,
                    )
                    .await
            }));
        }

        let mut numbers = Vec::new();
        for handle in handles {
            match handle.await.expect("tarefa abortada") {
                Ok(entry) => numbers.push(entry.queue_number),
                // Perdeu a corrida duas vezes: nada foi gravado para essa chamada
                Err(QueueError::Conflict(_)) => {}
                Err(other) => panic!("erro inesperado: {}", other),
            }
        }

        assert!(!numbers.is_empty());
        let mut deduped = numbers.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), numbers.len(), "números de senha duplicados");

        // O banco confirma: todo número confirmado é distinto no balde
        let committed: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_entries")
            .fetch_one(&ctx.pool)
            .await?;
        let distinct: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT queue_number) FROM queue_entries")
                .fetch_one(&ctx.pool)
                .await?;
        assert_eq!(committed, distinct);
        assert_eq!(committed as usize, numbers.len());
        Ok(())
    }
}
