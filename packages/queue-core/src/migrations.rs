//! Sistema de migrações para banco de dados
//!
//! Este módulo gerencia as migrações do banco de dados SQLite das filas

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{error, info};

/// Lista de migrações SQL a serem aplicadas
const MIGRATIONS: &[&str] = &[
    // 001_queue_schema.sql
    r#"
    -- Tabela de senhas de atendimento: a posição de um paciente em uma fila
    CREATE TABLE IF NOT EXISTS queue_entries (
        id TEXT PRIMARY KEY NOT NULL,
        visit_id TEXT NOT NULL,
        appointment_id TEXT NOT NULL,
        patient_id TEXT NOT NULL,
        service_id TEXT NOT NULL,
        queue_type TEXT NOT NULL,
        queue_day DATE NOT NULL,
        queue_number INTEGER NOT NULL,
        priority_level TEXT NOT NULL CHECK (priority_level IN ('emergency', 'priority', 'normal')),
        status TEXT NOT NULL CHECK (status IN ('waiting', 'in_progress', 'done', 'skipped', 'cancelled', 'no_show')),
        time_in TIMESTAMP NOT NULL,
        time_started TIMESTAMP,
        time_completed TIMESTAMP,
        waiting_time INTEGER,
        turnaround_time INTEGER,
        remarks TEXT,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    -- Unicidade do número de senha dentro do balde (serviço, tipo de fila, dia).
    -- A alocação lê o máximo e insere em seguida; este índice é a garantia
    -- contra duas transações concorrentes gravarem o mesmo número.
    CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_entries_bucket_number
        ON queue_entries (service_id, queue_type, queue_day, queue_number);

    -- Tabela de auditoria: registro imutável de toda mudança de estado
    CREATE TABLE IF NOT EXISTS queue_logs (
        id TEXT PRIMARY KEY NOT NULL,
        queue_entry_id TEXT NOT NULL,
        action TEXT NOT NULL CHECK (action IN ('created', 'status_changed', 'moved', 'reinstated')),
        old_status TEXT,
        new_status TEXT NOT NULL,
        remarks TEXT,
        performed_by TEXT,
        details TEXT, -- JSON com dados adicionais da ação (origem/destino de remanejamento)
        created_at TIMESTAMP NOT NULL,
        FOREIGN KEY (queue_entry_id) REFERENCES queue_entries (id)
    );

    -- Índices para otimização
    CREATE INDEX IF NOT EXISTS idx_queue_entries_bucket ON queue_entries (service_id, queue_type, queue_day);
    CREATE INDEX IF NOT EXISTS idx_queue_entries_status ON queue_entries (status);
    CREATE INDEX IF NOT EXISTS idx_queue_entries_patient_id ON queue_entries (patient_id);
    CREATE INDEX IF NOT EXISTS idx_queue_logs_entry_id ON queue_logs (queue_entry_id);
    "#,
];

/// Executa todas as migrações pendentes no banco de dados
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Aplicando migrações de banco de dados...");

    // Obter a versão atual do banco de dados
    let mut version: i64 = 0;
    match sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await
    {
        Ok(v) => version = v,
        Err(e) => {
            error!("Erro ao obter versão do banco: {}", e);
            // Continuar mesmo assim, pois pode ser a primeira execução
        }
    }

    info!("Versão atual do banco: {}", version);

    // Aplicar cada migração pendente sequencialmente
    for (i, migration_sql) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as i64;

        // Pular migrações já aplicadas
        if migration_version <= version {
            info!("Migração {} já aplicada", migration_version);
            continue;
        }

        info!("Aplicando migração {}...", migration_version);

        // Executar em uma transação para garantir atomicidade
        let mut transaction = pool.begin().await
            .context(format!("Falha ao iniciar transação para migração {}", migration_version))?;

        // Executar os comandos SQL
        sqlx::query(migration_sql)
            .execute(&mut *transaction)
            .await
            .context(format!("Falha ao executar migração {}", migration_version))?;

        // Atualizar versão do banco
        sqlx::query(&format!("PRAGMA user_version = {}", migration_version))
            .execute(&mut *transaction)
            .await
            .context(format!("Falha ao atualizar versão para {}", migration_version))?;

        // Commit da transação
        transaction.commit().await
            .context(format!("Falha ao confirmar transação para migração {}", migration_version))?;

        info!("Migração {} aplicada com sucesso", migration_version);
    }

    info!("Migrações concluídas. Versão atual: {}", MIGRATIONS.len());
    Ok(())
}
