//! Modelos de dados da fila de atendimento
//!
//! Este módulo define as estruturas de dados principais do gerenciador de filas

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

/// Status possíveis de uma senha na fila
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Aguardando atendimento
    Waiting,
    /// Em atendimento
    InProgress,
    /// Atendimento concluído (terminal, sem retorno)
    Done,
    /// Chamado e pulado pelo guichê
    Skipped,
    /// Cancelado
    Cancelled,
    /// Paciente não compareceu quando chamado
    NoShow,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Waiting => "waiting",
            QueueStatus::InProgress => "in_progress",
            QueueStatus::Done => "done",
            QueueStatus::Skipped => "skipped",
            QueueStatus::Cancelled => "cancelled",
            QueueStatus::NoShow => "no_show",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "waiting" => Some(QueueStatus::Waiting),
            "in_progress" => Some(QueueStatus::InProgress),
            "done" => Some(QueueStatus::Done),
            "skipped" => Some(QueueStatus::Skipped),
            "cancelled" => Some(QueueStatus::Cancelled),
            "no_show" => Some(QueueStatus::NoShow),
            _ => None,
        }
    }

    /// Indica se a senha pode ser reintegrada à fila a partir deste status
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            QueueStatus::Skipped | QueueStatus::Cancelled | QueueStatus::NoShow
        )
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Nível de prioridade de atendimento, fixado na criação da senha
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    /// Emergência: sempre atendido antes dos demais
    Emergency,
    /// Prioridade legal (idosos, gestantes, etc.)
    Priority,
    /// Atendimento comum
    #[default]
    Normal,
}

impl PriorityLevel {
    /// Chave de ordenação: quanto menor, mais cedo o atendimento
    pub fn tier(&self) -> u8 {
        match self {
            PriorityLevel::Emergency => 1,
            PriorityLevel::Priority => 2,
            PriorityLevel::Normal => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityLevel::Emergency => "emergency",
            PriorityLevel::Priority => "priority",
            PriorityLevel::Normal => "normal",
        }
    }

    /// Valores desconhecidos caem em `Normal`
    pub fn parse(value: &str) -> Self {
        match value {
            "emergency" => PriorityLevel::Emergency,
            "priority" => PriorityLevel::Priority,
            _ => PriorityLevel::Normal,
        }
    }
}

impl std::fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ação registrada na trilha de auditoria
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Created,
    StatusChanged,
    Moved,
    Reinstated,
}

impl LogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogAction::Created => "created",
            LogAction::StatusChanged => "status_changed",
            LogAction::Moved => "moved",
            LogAction::Reinstated => "reinstated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(LogAction::Created),
            "status_changed" => Some(LogAction::StatusChanged),
            "moved" => Some(LogAction::Moved),
            "reinstated" => Some(LogAction::Reinstated),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A posição de um paciente em uma fila de serviço
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Identificador único da senha
    pub id: Uuid,
    /// Visita à qual a senha pertence
    pub visit_id: Uuid,
    /// Consulta que originou a senha
    pub appointment_id: Uuid,
    /// Paciente na fila
    pub patient_id: Uuid,
    /// Serviço clínico atual (triagem, consultório, laboratório...)
    pub service_id: Uuid,
    /// Tipo de fila, escopo independente de numeração e ordenação
    pub queue_type: String,
    /// Dia-calendário do balde de numeração (segue `time_in`)
    pub queue_day: NaiveDate,
    /// Número sequencial, único dentro de (serviço, tipo de fila, dia)
    pub queue_number: i64,
    /// Prioridade fixada na criação, preservada em remanejamentos
    pub priority_level: PriorityLevel,
    /// Status atual na máquina de estados
    pub status: QueueStatus,
    /// Entrada na fila atual
    pub time_in: DateTime<Utc>,
    /// Início do atendimento
    pub time_started: Option<DateTime<Utc>>,
    /// Chegada a um status terminal
    pub time_completed: Option<DateTime<Utc>>,
    /// Minutos entre a entrada na fila e o início do atendimento
    pub waiting_time: Option<i64>,
    /// Minutos entre a entrada na fila e o status terminal
    pub turnaround_time: Option<i64>,
    /// Observações livres, sobrescritas a cada mutação que as informe
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn decode_error(column: &str, value: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: String::from(column),
        source: Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Valor inválido para {}: {}", column, value),
        )),
    }
}

impl FromRow<'_, SqliteRow> for QueueEntry {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let status_raw: String = row.try_get("status")?;
        let status = QueueStatus::parse(&status_raw)
            .ok_or_else(|| decode_error("status", &status_raw))?;

        let priority_raw: String = row.try_get("priority_level")?;

        Ok(Self {
            id: row.try_get("id")?,
            visit_id: row.try_get("visit_id")?,
            appointment_id: row.try_get("appointment_id")?,
            patient_id: row.try_get("patient_id")?,
            service_id: row.try_get("service_id")?,
            queue_type: row.try_get("queue_type")?,
            queue_day: row.try_get("queue_day")?,
            queue_number: row.try_get("queue_number")?,
            priority_level: PriorityLevel::parse(&priority_raw),
            status,
            time_in: row.try_get("time_in")?,
            time_started: row.try_get("time_started")?,
            time_completed: row.try_get("time_completed")?,
            waiting_time: row.try_get("waiting_time")?,
            turnaround_time: row.try_get("turnaround_time")?,
            remarks: row.try_get("remarks")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Registro imutável da trilha de auditoria
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueLog {
    /// Identificador único do registro
    pub id: Uuid,
    /// Senha à qual a mudança se refere
    pub queue_entry_id: Uuid,
    /// Ação realizada
    pub action: LogAction,
    /// Status anterior (nulo na criação)
    pub old_status: Option<QueueStatus>,
    /// Status após a ação
    pub new_status: QueueStatus,
    /// Observações informadas na ação
    pub remarks: Option<String>,
    /// Funcionário responsável (nulo para ações do sistema)
    pub performed_by: Option<String>,
    /// Dados adicionais da ação (origem/destino de remanejamento)
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for QueueLog {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let action_raw: String = row.try_get("action")?;
        let action = LogAction::parse(&action_raw)
            .ok_or_else(|| decode_error("action", &action_raw))?;

        let old_status = match row.try_get::<Option<String>, _>("old_status")? {
            Some(raw) => Some(
                QueueStatus::parse(&raw).ok_or_else(|| decode_error("old_status", &raw))?,
            ),
            None => None,
        };

        let new_status_raw: String = row.try_get("new_status")?;
        let new_status = QueueStatus::parse(&new_status_raw)
            .ok_or_else(|| decode_error("new_status", &new_status_raw))?;

        let details = match row.try_get::<Option<String>, _>("details")? {
            Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| {
                sqlx::Error::ColumnDecode {
                    index: String::from("details"),
                    source: Box::new(e),
                }
            })?),
            None => None,
        };

        Ok(Self {
            id: row.try_get("id")?,
            queue_entry_id: row.try_get("queue_entry_id")?,
            action,
            old_status,
            new_status,
            remarks: row.try_get("remarks")?,
            performed_by: row.try_get("performed_by")?,
            details,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Origem e destino de um remanejamento, gravados no campo `details` do log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovedDetails {
    pub from_service_id: Uuid,
    pub to_service_id: Uuid,
    pub from_queue_type: String,
    pub to_queue_type: String,
    pub from_queue_number: i64,
    pub to_queue_number: i64,
}
