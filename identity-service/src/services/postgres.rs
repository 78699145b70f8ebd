//! PostgreSQL implementation of [`IdentityStore`].
//!
//! Multi-statement operations run in one transaction. Row locks (`FOR UPDATE`)
//! serialize per-user writes where a constraint alone is not enough.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool};
use uuid::Uuid;

use super::store::{AuditQuery, ConsumeOutcome, IdentityStore, StoreError, PROFILE_EXISTS};
use crate::models::{
    AuditEvent, DoctorProfile, PatientProfile, PhoneNumber, RefreshSession, Role, RoleProfile,
    StaffProfile, StaffRole, TokenEffect, TokenKind, User, VerificationToken,
};

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StoreError::UniqueViolation {
                    constraint: db_err.constraint().unwrap_or_default().to_string(),
                };
            }
        }
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Backend(anyhow::anyhow!(other)),
        }
    }
}

/// Primary-key collisions on the profile tables mean "already has one".
fn profile_exists_on_pkey(err: StoreError) -> StoreError {
    match err {
        StoreError::UniqueViolation { constraint } if constraint.ends_with("_pkey") => {
            StoreError::unique(PROFILE_EXISTS)
        }
        other => other,
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn insert_user(conn: &mut PgConnection, user: &User) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO users (user_id, email, password_hash, first_name, last_name, role,
                           email_verified, is_active, is_staff, is_superuser, deleted_utc,
                           created_utc, updated_utc)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(user.user_id)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(user.role)
    .bind(user.email_verified)
    .bind(user.is_active)
    .bind(user.is_staff)
    .bind(user.is_superuser)
    .bind(user.deleted_utc)
    .bind(user.created_utc)
    .bind(user.updated_utc)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Insert a role profile. With `skip_existing` an existing row is left as is.
async fn insert_role_profile(
    conn: &mut PgConnection,
    profile: &RoleProfile,
    skip_existing: bool,
) -> Result<(), StoreError> {
    let on_conflict = if skip_existing {
        " ON CONFLICT (user_id) DO NOTHING"
    } else {
        ""
    };

    match profile {
        RoleProfile::Patient(p) => {
            let sql = format!(
                "INSERT INTO patient_profiles (user_id, date_of_birth, gender, address, \
                 medical_history, bio, created_utc, updated_utc) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8){}",
                on_conflict
            );
            sqlx::query(&sql)
                .bind(p.user_id)
                .bind(p.date_of_birth)
                .bind(p.gender)
                .bind(&p.address)
                .bind(&p.medical_history)
                .bind(&p.bio)
                .bind(p.created_utc)
                .bind(p.updated_utc)
                .execute(&mut *conn)
                .await?;
        }
        RoleProfile::Doctor(p) => {
            let sql = format!(
                "INSERT INTO doctor_profiles (user_id, license_number, specialty, \
                 years_experience, hospital_affiliation, bio, created_utc, updated_utc) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8){}",
                on_conflict
            );
            sqlx::query(&sql)
                .bind(p.user_id)
                .bind(&p.license_number)
                .bind(&p.specialty)
                .bind(p.years_experience)
                .bind(&p.hospital_affiliation)
                .bind(&p.bio)
                .bind(p.created_utc)
                .bind(p.updated_utc)
                .execute(&mut *conn)
                .await?;
        }
        RoleProfile::Staff(p) => {
            let sql = format!(
                "INSERT INTO staff_profiles (user_id, staff_role, created_utc, updated_utc) \
                 VALUES ($1, $2, $3, $4){}",
                on_conflict
            );
            sqlx::query(&sql)
                .bind(p.user_id)
                .bind(p.staff_role)
                .bind(p.created_utc)
                .bind(p.updated_utc)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

async fn revoke_user_sessions(
    conn: &mut PgConnection,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<Uuid>, StoreError> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        "UPDATE refresh_sessions SET revoked_utc = $2 \
         WHERE user_id = $1 AND revoked_utc IS NULL RETURNING session_id",
    )
    .bind(user_id)
    .bind(now)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids)
}

/// Take the per-user write lock. `NotFound` if the user does not exist.
async fn lock_user(conn: &mut PgConnection, user_id: Uuid) -> Result<(), StoreError> {
    sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM users WHERE user_id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::NotFound)?;
    Ok(())
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                StoreError::from(e)
            })?;
        Ok(())
    }

    // ==================== Users ====================

    async fn create_account(
        &self,
        user: &User,
        profile: Option<&RoleProfile>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        insert_user(&mut tx, user).await?;
        if let Some(profile) = profile {
            insert_role_profile(&mut tx, profile, false).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_utc = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn soft_delete_user(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE users SET is_active = FALSE, deleted_utc = $2, updated_utc = $2 \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(at)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        let revoked = revoke_user_sessions(&mut tx, user_id, at).await?;
        tx.commit().await?;
        Ok(revoked)
    }

    async fn assign_role(
        &self,
        user_id: Uuid,
        role: Role,
        profile: Option<&RoleProfile>,
    ) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query("UPDATE users SET role = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(role)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        if let Some(profile) = profile {
            insert_role_profile(&mut tx, profile, true).await?;
        }
        // Staff class follows the current role and staff profile.
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET \
                 is_staff = (role = 'admin' OR EXISTS \
                     (SELECT 1 FROM staff_profiles s WHERE s.user_id = users.user_id)), \
                 updated_utc = NOW() \
             WHERE user_id = $1 RETURNING *",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(user)
    }

    // ==================== Role profiles ====================

    async fn insert_profile(&self, profile: &RoleProfile) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_role_profile(&mut conn, profile, false)
            .await
            .map_err(profile_exists_on_pkey)
    }

    async fn find_patient_profile(
        &self,
        user_id: Uuid,
    ) -> Result<Option<PatientProfile>, StoreError> {
        let profile =
            sqlx::query_as::<_, PatientProfile>("SELECT * FROM patient_profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(profile)
    }

    async fn find_doctor_profile(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DoctorProfile>, StoreError> {
        let profile =
            sqlx::query_as::<_, DoctorProfile>("SELECT * FROM doctor_profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(profile)
    }

    async fn find_staff_profile(&self, user_id: Uuid) -> Result<Option<StaffProfile>, StoreError> {
        let profile =
            sqlx::query_as::<_, StaffProfile>("SELECT * FROM staff_profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(profile)
    }

    async fn update_patient_profile(&self, profile: &PatientProfile) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE patient_profiles
            SET date_of_birth = $2, gender = $3, address = $4, medical_history = $5,
                bio = $6, updated_utc = $7
            WHERE user_id = $1
            "#,
        )
        .bind(profile.user_id)
        .bind(profile.date_of_birth)
        .bind(profile.gender)
        .bind(&profile.address)
        .bind(&profile.medical_history)
        .bind(&profile.bio)
        .bind(profile.updated_utc)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn update_doctor_profile(&self, profile: &DoctorProfile) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE doctor_profiles
            SET license_number = $2, specialty = $3, years_experience = $4,
                hospital_affiliation = $5, bio = $6, updated_utc = $7
            WHERE user_id = $1
            "#,
        )
        .bind(profile.user_id)
        .bind(&profile.license_number)
        .bind(&profile.specialty)
        .bind(profile.years_experience)
        .bind(&profile.hospital_affiliation)
        .bind(&profile.bio)
        .bind(profile.updated_utc)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn upsert_staff_profile(
        &self,
        user_id: Uuid,
        staff_role: StaffRole,
    ) -> Result<StaffProfile, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result =
            sqlx::query("UPDATE users SET is_staff = TRUE, updated_utc = NOW() WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        let profile = sqlx::query_as::<_, StaffProfile>(
            r#"
            INSERT INTO staff_profiles (user_id, staff_role, created_utc, updated_utc)
            VALUES ($1, $2, NOW(), NOW())
            ON CONFLICT (user_id)
            DO UPDATE SET staff_role = EXCLUDED.staff_role, updated_utc = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(staff_role)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(profile)
    }

    async fn delete_staff_profile(&self, user_id: Uuid) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM staff_profiles WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        sqlx::query(
            "UPDATE users SET is_staff = (role = 'admin'), updated_utc = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    // ==================== Phone numbers ====================

    async fn insert_phone(&self, phone: &PhoneNumber) -> Result<PhoneNumber, StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, phone.user_id).await?;

        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM phone_numbers WHERE user_id = $1")
                .bind(phone.user_id)
                .fetch_one(&mut *tx)
                .await?;
        let make_primary = phone.is_primary || existing == 0;

        if make_primary {
            sqlx::query(
                "UPDATE phone_numbers SET is_primary = FALSE, updated_utc = NOW() \
                 WHERE user_id = $1 AND is_primary",
            )
            .bind(phone.user_id)
            .execute(&mut *tx)
            .await?;
        }

        let stored = sqlx::query_as::<_, PhoneNumber>(
            r#"
            INSERT INTO phone_numbers (phone_id, user_id, number, phone_kind, is_primary,
                                       created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(phone.phone_id)
        .bind(phone.user_id)
        .bind(&phone.number)
        .bind(phone.phone_kind)
        .bind(make_primary)
        .bind(phone.created_utc)
        .bind(phone.updated_utc)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn list_phones(&self, user_id: Uuid) -> Result<Vec<PhoneNumber>, StoreError> {
        let phones = sqlx::query_as::<_, PhoneNumber>(
            "SELECT * FROM phone_numbers WHERE user_id = $1 ORDER BY is_primary DESC, created_utc",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(phones)
    }

    async fn set_primary_phone(
        &self,
        user_id: Uuid,
        phone_id: Uuid,
    ) -> Result<PhoneNumber, StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, user_id).await?;

        sqlx::query_scalar::<_, Uuid>(
            "SELECT phone_id FROM phone_numbers WHERE phone_id = $1 AND user_id = $2",
        )
        .bind(phone_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        sqlx::query(
            "UPDATE phone_numbers SET is_primary = FALSE, updated_utc = NOW() \
             WHERE user_id = $1 AND is_primary AND phone_id <> $2",
        )
        .bind(user_id)
        .bind(phone_id)
        .execute(&mut *tx)
        .await?;

        let phone = sqlx::query_as::<_, PhoneNumber>(
            "UPDATE phone_numbers SET is_primary = TRUE, updated_utc = NOW() \
             WHERE phone_id = $1 RETURNING *",
        )
        .bind(phone_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(phone)
    }

    async fn delete_phone(&self, user_id: Uuid, phone_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM phone_numbers WHERE phone_id = $1 AND user_id = $2")
            .bind(phone_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== Tokens ====================

    async fn replace_token(&self, token: &VerificationToken) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM verification_tokens WHERE user_id = $1 AND token_kind = $2")
            .bind(token.user_id)
            .bind(token.token_kind)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO verification_tokens (token_id, token_hash, user_id, token_kind,
                                             expiry_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.token_id)
        .bind(&token.token_hash)
        .bind(token.user_id)
        .bind(token.token_kind)
        .bind(token.expiry_utc)
        .bind(token.created_utc)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_token(
        &self,
        token_hash: &str,
        kind: TokenKind,
    ) -> Result<Option<VerificationToken>, StoreError> {
        let token = sqlx::query_as::<_, VerificationToken>(
            "SELECT * FROM verification_tokens WHERE token_hash = $1 AND token_kind = $2",
        )
        .bind(token_hash)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn consume_token(
        &self,
        token_hash: &str,
        effect: &TokenEffect,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        // A concurrent consumer blocks on the row lock and then sees no row.
        let token = sqlx::query_as::<_, VerificationToken>(
            "DELETE FROM verification_tokens WHERE token_hash = $1 AND token_kind = $2 RETURNING *",
        )
        .bind(token_hash)
        .bind(effect.kind())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(token) = token else {
            tx.rollback().await?;
            return Ok(ConsumeOutcome::Invalid);
        };

        if token.is_expired_at(now) {
            tx.rollback().await?;
            return Ok(ConsumeOutcome::Expired);
        }

        let revoked_sessions = match effect {
            TokenEffect::MarkEmailVerified => {
                sqlx::query(
                    "UPDATE users SET email_verified = TRUE, updated_utc = $2 WHERE user_id = $1",
                )
                .bind(token.user_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                Vec::new()
            }
            TokenEffect::SetPasswordHash(hash) => {
                sqlx::query(
                    "UPDATE users SET password_hash = $2, updated_utc = $3 WHERE user_id = $1",
                )
                .bind(token.user_id)
                .bind(hash)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                revoke_user_sessions(&mut tx, token.user_id, now).await?
            }
        };

        tx.commit().await?;
        Ok(ConsumeOutcome::Consumed {
            user_id: token.user_id,
            revoked_sessions,
        })
    }

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &RefreshSession) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_sessions (session_id, user_id, token_hash_text, user_agent,
                                          ip_address, expiry_utc, revoked_utc, created_utc,
                                          last_used_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(session.session_id)
        .bind(session.user_id)
        .bind(&session.token_hash_text)
        .bind(&session.user_agent)
        .bind(&session.ip_address)
        .bind(session.expiry_utc)
        .bind(session.revoked_utc)
        .bind(session.created_utc)
        .bind(session.last_used_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<RefreshSession>, StoreError> {
        let session = sqlx::query_as::<_, RefreshSession>(
            "SELECT * FROM refresh_sessions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn list_live_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshSession>, StoreError> {
        let sessions = sqlx::query_as::<_, RefreshSession>(
            "SELECT * FROM refresh_sessions \
             WHERE user_id = $1 AND revoked_utc IS NULL AND expiry_utc > $2 \
             ORDER BY created_utc DESC",
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    async fn rotate_session_token(
        &self,
        session_id: Uuid,
        expected_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_sessions SET token_hash_text = $3, last_used_utc = $4 \
             WHERE session_id = $1 AND token_hash_text = $2 \
               AND revoked_utc IS NULL AND expiry_utc > $4",
        )
        .bind(session_id)
        .bind(expected_hash)
        .bind(new_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_sessions SET revoked_utc = $2 \
             WHERE session_id = $1 AND revoked_utc IS NULL",
        )
        .bind(session_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        revoke_user_sessions(&mut conn, user_id, now).await
    }

    // ==================== Audit ====================

    async fn append_audit_event(&self, event: &AuditEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_events (event_id, actor_user_id, action_code, detail, created_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.event_id)
        .bind(event.actor_user_id)
        .bind(&event.action_code)
        .bind(&event.detail)
        .bind(event.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_audit_events(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>, StoreError> {
        let events = sqlx::query_as::<_, AuditEvent>(
            r#"
            SELECT * FROM audit_events
            WHERE ($1::uuid IS NULL OR actor_user_id = $1)
              AND ($2::text IS NULL OR action_code = $2)
            ORDER BY created_utc DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(query.actor_user_id)
        .bind(&query.action_code)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }
}
