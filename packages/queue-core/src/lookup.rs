//! Interfaces de consulta a entidades externas
//!
//! A fila referencia consultas, visitas e pacientes mantidos por outros
//! módulos do ecossistema da clínica. Este módulo define a fronteira de
//! consulta que o gerenciador precisa; a implementação vive fora daqui.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::QueueError;

/// Resolução de consulta em visita.
///
/// Uma consulta que ainda não foi convertida em visita não pode entrar na
/// fila; nesses casos a implementação retorna `Ok(None)`.
#[async_trait]
pub trait VisitLookup: Send + Sync {
    /// Visita associada à consulta, se existir
    async fn visit_for_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Option<Uuid>, QueueError>;
}
