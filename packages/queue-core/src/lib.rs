//! Queue Core - Biblioteca de gestão de filas de atendimento clínico
//!
//! Esta biblioteca fornece:
//! - Modelos de dados das filas de atendimento (senhas, prioridades, status)
//! - Máquina de estados para as transições de status de cada senha
//! - Alocação sequencial de senhas por (serviço, tipo de fila, dia)
//! - Ordenação por prioridade e estimativa de tempo de espera
//! - Trilha de auditoria imutável de toda mudança de estado
//! - Pool de conexão e migrações automáticas para SQLite

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod allocator;
pub mod audit;
pub mod error;
pub mod estimator;
pub mod lookup;
pub mod manager;
pub mod migrations;
pub mod models;
pub mod transitions;

/// Configuração da conexão com o banco de dados
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Caminho para o arquivo SQLite
    pub db_path: String,
    /// Número máximo de conexões no pool
    pub max_connections: u32,
    /// Tempo de espera por um bloqueio de escrita, em segundos
    pub busy_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            db_path: "data/queue.db".to_string(),
            max_connections: 5,
            busy_timeout_secs: 5,
        }
    }
}

/// Parâmetros de negócio da fila de atendimento
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Tempo médio de atendimento por paciente, em minutos.
    ///
    /// Constante configurada pelo negócio, usada pela estimativa de espera.
    /// Não é uma estatística medida.
    pub avg_service_minutes: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            avg_service_minutes: 10,
        }
    }
}

/// Inicializa uma conexão com o banco de dados SQLite das filas
pub async fn init_db_pool(config: &DbConfig) -> Result<SqlitePool> {
    let db_path = Path::new(&config.db_path);

    // Verifica se o diretório pai existe
    if let Some(parent) = db_path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)
                .context("Falha ao criar diretório para banco de dados")?;
        }
    }

    // Configura as opções de conexão SQLite
    let connection_options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
        .pragma("synchronous", "NORMAL");

    // Cria o pool de conexões
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(connection_options)
        .await
        .context("Falha ao conectar ao banco de dados SQLite")?;

    // Aplica migrações automáticas
    migrations::run_migrations(&pool).await
        .context("Falha ao aplicar migrações")?;

    info!("Banco de dados inicializado com sucesso: {}", config.db_path);
    Ok(pool)
}
