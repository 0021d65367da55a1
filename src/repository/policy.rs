//! Policy tuple store

use crate::domain::{
    MethodSpec, PermissionKey, PolicyFilter, PolicyTuple, StringUuid, SubjectRef, TenantId,
};
use crate::error::{AppError, Result};
use crate::policy::action_matches;
use async_trait::async_trait;
use sqlx::{MySql, MySqlPool, QueryBuilder};

/// Persistent `(subject, object, action)` table.
///
/// `add_policy` trusts the caller on subject/object tenant consistency;
/// `grant_checked` verifies it inside the same atomic unit as the insert.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Returns false when the tuple already existed
    async fn add_policy(&self, tuple: &PolicyTuple) -> Result<bool>;
    /// Insert `tuple` only if its role and its permission key both belong to
    /// `tenant_id`, checked atomically with the insert. Returns false when
    /// the tuple already existed.
    async fn grant_checked(&self, tenant_id: TenantId, tuple: &PolicyTuple) -> Result<bool>;
    /// Returns false when no such tuple existed
    async fn remove_policy(&self, tuple: &PolicyTuple) -> Result<bool>;
    async fn query_policies(&self, filter: &PolicyFilter) -> Result<Vec<PolicyTuple>>;
    /// Returns the number of removed tuples. An empty filter is rejected.
    async fn remove_filtered_policies(&self, filter: &PolicyFilter) -> Result<u64>;

    /// Enforcement predicate: does any stored tuple for `(subject, object)`
    /// carry an action covering `action`?
    async fn enforce(
        &self,
        subject: SubjectRef,
        object: &PermissionKey,
        action: MethodSpec,
    ) -> Result<bool> {
        let filter = PolicyFilter {
            subject: Some(subject),
            object: Some(object.clone()),
            action: None,
        };
        let tuples = self.query_policies(&filter).await?;
        Ok(tuples.iter().any(|t| action_matches(t.action, action)))
    }
}

pub struct PolicyStoreImpl {
    pool: MySqlPool,
}

impl PolicyStoreImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PolicyRow {
    subject: String,
    object: String,
    action: String,
}

impl TryFrom<PolicyRow> for PolicyTuple {
    type Error = AppError;

    fn try_from(row: PolicyRow) -> Result<Self> {
        let corrupt = |e: AppError| {
            AppError::Internal(anyhow::anyhow!("Corrupt policy row: {}", e))
        };
        Ok(PolicyTuple {
            subject: row.subject.parse().map_err(corrupt)?,
            object: PermissionKey::parse(&row.object).map_err(corrupt)?,
            action: row.action.parse().map_err(corrupt)?,
        })
    }
}

fn push_clause(builder: &mut QueryBuilder<'_, MySql>, first: &mut bool) {
    builder.push(if *first { " WHERE " } else { " AND " });
    *first = false;
}

fn push_filter(builder: &mut QueryBuilder<'_, MySql>, filter: &PolicyFilter) {
    let mut first = true;
    if let Some(subject) = filter.subject {
        push_clause(builder, &mut first);
        builder.push("subject = ").push_bind(subject.to_string());
    }
    if let Some(object) = &filter.object {
        push_clause(builder, &mut first);
        builder.push("object = ").push_bind(object.as_str().to_string());
    }
    if let Some(action) = filter.action {
        push_clause(builder, &mut first);
        builder.push("action = ").push_bind(action.as_str());
    }
}

#[async_trait]
impl PolicyStore for PolicyStoreImpl {
    async fn add_policy(&self, tuple: &PolicyTuple) -> Result<bool> {
        let result = sqlx::query(
            "INSERT IGNORE INTO authz_policies (subject, object, action) VALUES (?, ?, ?)",
        )
        .bind(tuple.subject.to_string())
        .bind(tuple.object.as_str())
        .bind(tuple.action)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn grant_checked(&self, tenant_id: TenantId, tuple: &PolicyTuple) -> Result<bool> {
        let role_id = tuple.subject.role_id();
        let mut tx = self.pool.begin().await?;

        // Locking reads serialize with role deletion and permission rename/delete
        let role: Option<(TenantId,)> =
            sqlx::query_as("SELECT tenant_id FROM authz_roles WHERE id = ? FOR UPDATE")
                .bind(role_id)
                .fetch_optional(&mut *tx)
                .await?;
        match role {
            None => {
                tx.rollback().await?;
                return Err(AppError::NotFound(format!("Role {} not found", role_id)));
            }
            Some((owner,)) if owner != tenant_id => {
                tx.rollback().await?;
                return Err(AppError::cross_tenant(tenant_id, owner));
            }
            Some(_) => {}
        }

        let permission: Option<(StringUuid,)> = sqlx::query_as(
            "SELECT id FROM authz_permissions WHERE tenant_id = ? AND perm_key = ? FOR UPDATE",
        )
        .bind(tenant_id)
        .bind(tuple.object.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        if permission.is_none() {
            tx.rollback().await?;
            return Err(AppError::NotFound(format!(
                "Permission {} not found",
                tuple.object
            )));
        }

        let result = sqlx::query(
            "INSERT IGNORE INTO authz_policies (subject, object, action) VALUES (?, ?, ?)",
        )
        .bind(tuple.subject.to_string())
        .bind(tuple.object.as_str())
        .bind(tuple.action)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_policy(&self, tuple: &PolicyTuple) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM authz_policies WHERE subject = ? AND object = ? AND action = ?",
        )
        .bind(tuple.subject.to_string())
        .bind(tuple.object.as_str())
        .bind(tuple.action)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn query_policies(&self, filter: &PolicyFilter) -> Result<Vec<PolicyTuple>> {
        let mut builder = QueryBuilder::<MySql>::new(
            "SELECT subject, object, action FROM authz_policies",
        );
        push_filter(&mut builder, filter);
        builder.push(" ORDER BY subject, object, action");

        let rows: Vec<PolicyRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(PolicyTuple::try_from).collect()
    }

    async fn remove_filtered_policies(&self, filter: &PolicyFilter) -> Result<u64> {
        if filter.is_empty() {
            return Err(AppError::BadRequest(
                "Refusing to remove policies with an empty filter".to_string(),
            ));
        }
        let mut builder = QueryBuilder::<MySql>::new("DELETE FROM authz_policies");
        push_filter(&mut builder, filter);

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn enforce(
        &self,
        subject: SubjectRef,
        object: &PermissionKey,
        action: MethodSpec,
    ) -> Result<bool> {
        let found: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM authz_policies
            WHERE subject = ? AND object = ? AND (action = '*' OR action = ?)
            LIMIT 1
            "#,
        )
        .bind(subject.to_string())
        .bind(object.as_str())
        .bind(action)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }
}
