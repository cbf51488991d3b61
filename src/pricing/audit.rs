// Calculation audit trail
//
// Records calculation summaries and applied discounts for compliance and
// debugging. Failures are logged and swallowed so auditing never blocks a
// price calculation.

use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

/// Audit Logger
///
/// Writes pricing events to the audit trail. Errors do not propagate.
pub struct AuditLogger {
    pool: PgPool,
}

impl AuditLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Log the summary of one completed calculation
    pub async fn log_calculation(&self, calculation_id: Uuid, data: JsonValue, effect: &str) {
        if let Err(e) = self
            .insert_audit_record(calculation_id, "calculation", data, effect)
            .await
        {
            tracing::warn!("Failed to log calculation audit record: {}", e);
        }
    }

    /// Log one applied discount code
    pub async fn log_discount_application(
        &self,
        calculation_id: Uuid,
        data: JsonValue,
        effect: &str,
    ) {
        if let Err(e) = self
            .insert_audit_record(calculation_id, "discount", data, effect)
            .await
        {
            tracing::warn!("Failed to log discount audit record: {}", e);
        }
    }

    async fn insert_audit_record(
        &self,
        calculation_id: Uuid,
        record_type: &str,
        data: JsonValue,
        effect: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO pricing_audit (audit_id, calculation_id, record_type, record_data, effect)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(calculation_id)
        .bind(record_type)
        .bind(data)
        .bind(effect)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
