//! Identity and role store backed by PostgreSQL

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Row};

use super::{ActorStore, Repository};
use crate::{
    error::{AppError, AppResult},
    models::{Actor, Grade, RoleSet},
};

const ACTOR_SELECT: &str = r#"
    SELECT a.id, a.login, a.display_name, a.email, a.deleted_at,
           g.id AS grade_id, g.code AS grade_code, g.level AS grade_level,
           ARRAY(
               SELECT r.role FROM actor_roles r
               WHERE r.actor_id = a.id
               ORDER BY r.role
           ) AS roles
    FROM actors a
    LEFT JOIN grades g ON g.id = a.grade_id
    WHERE a.id = $1
"#;

fn actor_from_row(row: &PgRow) -> Actor {
    let grade = row
        .get::<Option<i32>, _>("grade_id")
        .map(|id| Grade {
            id,
            code: row.get("grade_code"),
            level: row.get("grade_level"),
        });
    let roles: Vec<String> = row.get("roles");

    Actor {
        id: row.get("id"),
        login: row.get("login"),
        display_name: row.get("display_name"),
        email: row.get("email"),
        roles: roles.into_iter().collect(),
        grade,
        deleted_at: row.get::<Option<DateTime<Utc>>, _>("deleted_at"),
    }
}

#[async_trait]
impl ActorStore for Repository {
    async fn get_actor(&self, id: i32) -> AppResult<Option<Actor>> {
        let row = sqlx::query(ACTOR_SELECT)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(actor_from_row))
    }

    async fn get_grade(&self, id: i32) -> AppResult<Option<Grade>> {
        let row = sqlx::query("SELECT id, code, level FROM grades WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Grade {
            id: r.get("id"),
            code: r.get("code"),
            level: r.get("level"),
        }))
    }

    async fn set_roles(&self, actor_id: i32, roles: &RoleSet, stamped_by: i32) -> AppResult<Actor> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query(
            "UPDATE actors SET updated_at = $2, updated_by = $3 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(actor_id)
        .bind(now)
        .bind(stamped_by)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if touched == 0 {
            return Err(AppError::NotFound(format!("Actor {} not found", actor_id)));
        }

        sqlx::query("DELETE FROM actor_roles WHERE actor_id = $1")
            .bind(actor_id)
            .execute(&mut *tx)
            .await?;

        for role in roles.iter() {
            sqlx::query(
                "INSERT INTO actor_roles (actor_id, role, granted_by, granted_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(actor_id)
            .bind(role)
            .bind(stamped_by)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.get_actor(actor_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Actor {} not found", actor_id)))
    }

    async fn set_grade(&self, actor_id: i32, grade_id: Option<i32>, stamped_by: i32) -> AppResult<Actor> {
        let touched = sqlx::query(
            r#"
            UPDATE actors SET grade_id = $2, updated_at = $3, updated_by = $4
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(actor_id)
        .bind(grade_id)
        .bind(Utc::now())
        .bind(stamped_by)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if touched == 0 {
            return Err(AppError::NotFound(format!("Actor {} not found", actor_id)));
        }

        self.get_actor(actor_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Actor {} not found", actor_id)))
    }
}
