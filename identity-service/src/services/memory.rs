//! In-process [`IdentityStore`] used by tests and local runs.
//!
//! All tables sit behind one mutex, so every method is serializable. The
//! same constraint names as the Postgres schema are reported on conflict.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::store::{
    AuditQuery, ConsumeOutcome, IdentityStore, StoreError, EMAIL_UNIQUE, LICENSE_UNIQUE,
    PROFILE_EXISTS,
};
use crate::models::{
    AuditEvent, DoctorProfile, PatientProfile, PhoneNumber, RefreshSession, Role, RoleProfile,
    StaffProfile, StaffRole, TokenEffect, TokenKind, User, VerificationToken,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    patients: HashMap<Uuid, PatientProfile>,
    doctors: HashMap<Uuid, DoctorProfile>,
    staff: HashMap<Uuid, StaffProfile>,
    phones: HashMap<Uuid, PhoneNumber>,
    tokens: HashMap<String, VerificationToken>,
    sessions: HashMap<Uuid, RefreshSession>,
    audit: Vec<AuditEvent>,
}

impl Tables {
    fn license_taken(&self, license: Option<&str>, except_user: Uuid) -> bool {
        match license {
            Some(license) => self
                .doctors
                .values()
                .any(|d| d.user_id != except_user && d.license_number.as_deref() == Some(license)),
            None => false,
        }
    }

    fn has_profile(&self, profile: &RoleProfile) -> bool {
        let user_id = profile.user_id();
        match profile {
            RoleProfile::Patient(_) => self.patients.contains_key(&user_id),
            RoleProfile::Doctor(_) => self.doctors.contains_key(&user_id),
            RoleProfile::Staff(_) => self.staff.contains_key(&user_id),
        }
    }

    /// Check constraints for `profile` without writing anything.
    fn check_profile(&self, profile: &RoleProfile) -> Result<(), StoreError> {
        if !self.users.contains_key(&profile.user_id()) {
            return Err(StoreError::NotFound);
        }
        if self.has_profile(profile) {
            return Err(StoreError::unique(PROFILE_EXISTS));
        }
        if let RoleProfile::Doctor(d) = profile {
            if self.license_taken(d.license_number.as_deref(), d.user_id) {
                return Err(StoreError::unique(LICENSE_UNIQUE));
            }
        }
        Ok(())
    }

    fn put_profile(&mut self, profile: &RoleProfile) {
        match profile {
            RoleProfile::Patient(p) => {
                self.patients.insert(p.user_id, p.clone());
            }
            RoleProfile::Doctor(p) => {
                self.doctors.insert(p.user_id, p.clone());
            }
            RoleProfile::Staff(p) => {
                self.staff.insert(p.user_id, p.clone());
            }
        }
    }

    fn revoke_sessions_of(&mut self, user_id: Uuid, now: DateTime<Utc>) -> Vec<Uuid> {
        let mut revoked = Vec::new();
        for session in self.sessions.values_mut() {
            if session.user_id == user_id && session.revoked_utc.is_none() {
                session.revoked_utc = Some(now);
                revoked.push(session.session_id);
            }
        }
        revoked
    }

    fn clear_primary(&mut self, user_id: Uuid, now: DateTime<Utc>) {
        for phone in self.phones.values_mut() {
            if phone.user_id == user_id && phone.is_primary {
                phone.is_primary = false;
                phone.updated_utc = now;
            }
        }
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("In-memory store mutex poisoned: {}", e)))
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }

    // ==================== Users ====================

    async fn create_account(
        &self,
        user: &User,
        profile: Option<&RoleProfile>,
    ) -> Result<(), StoreError> {
        let mut t = self.lock()?;
        if t.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::unique(EMAIL_UNIQUE));
        }
        if let Some(RoleProfile::Doctor(d)) = profile {
            if t.license_taken(d.license_number.as_deref(), d.user_id) {
                return Err(StoreError::unique(LICENSE_UNIQUE));
            }
        }
        t.users.insert(user.user_id, user.clone());
        if let Some(profile) = profile {
            t.put_profile(profile);
        }
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        let mut t = self.lock()?;
        let user = t.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.password_hash = password_hash.to_string();
        user.updated_utc = Utc::now();
        Ok(())
    }

    async fn soft_delete_user(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let mut t = self.lock()?;
        let user = t.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.is_active = false;
        user.deleted_utc = Some(at);
        user.updated_utc = at;
        Ok(t.revoke_sessions_of(user_id, at))
    }

    async fn assign_role(
        &self,
        user_id: Uuid,
        role: Role,
        profile: Option<&RoleProfile>,
    ) -> Result<User, StoreError> {
        let mut t = self.lock()?;
        if !t.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        if let Some(profile) = profile {
            if !t.has_profile(profile) {
                t.check_profile(profile)?;
                t.put_profile(profile);
            }
        }
        let has_staff_profile = t.staff.contains_key(&user_id);
        let user = t.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.role = role;
        user.is_staff = role == Role::Admin || has_staff_profile;
        user.updated_utc = Utc::now();
        Ok(user.clone())
    }

    // ==================== Role profiles ====================

    async fn insert_profile(&self, profile: &RoleProfile) -> Result<(), StoreError> {
        let mut t = self.lock()?;
        t.check_profile(profile)?;
        t.put_profile(profile);
        Ok(())
    }

    async fn find_patient_profile(
        &self,
        user_id: Uuid,
    ) -> Result<Option<PatientProfile>, StoreError> {
        Ok(self.lock()?.patients.get(&user_id).cloned())
    }

    async fn find_doctor_profile(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DoctorProfile>, StoreError> {
        Ok(self.lock()?.doctors.get(&user_id).cloned())
    }

    async fn find_staff_profile(&self, user_id: Uuid) -> Result<Option<StaffProfile>, StoreError> {
        Ok(self.lock()?.staff.get(&user_id).cloned())
    }

    async fn update_patient_profile(&self, profile: &PatientProfile) -> Result<(), StoreError> {
        let mut t = self.lock()?;
        let slot = t
            .patients
            .get_mut(&profile.user_id)
            .ok_or(StoreError::NotFound)?;
        *slot = profile.clone();
        Ok(())
    }

    async fn update_doctor_profile(&self, profile: &DoctorProfile) -> Result<(), StoreError> {
        let mut t = self.lock()?;
        if !t.doctors.contains_key(&profile.user_id) {
            return Err(StoreError::NotFound);
        }
        if t.license_taken(profile.license_number.as_deref(), profile.user_id) {
            return Err(StoreError::unique(LICENSE_UNIQUE));
        }
        t.doctors.insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn upsert_staff_profile(
        &self,
        user_id: Uuid,
        staff_role: StaffRole,
    ) -> Result<StaffProfile, StoreError> {
        let mut t = self.lock()?;
        let now = Utc::now();
        let user = t.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.is_staff = true;
        user.updated_utc = now;

        let profile = match t.staff.get(&user_id) {
            Some(existing) => StaffProfile {
                staff_role,
                updated_utc: now,
                ..existing.clone()
            },
            None => StaffProfile::new(user_id, staff_role),
        };
        t.staff.insert(user_id, profile.clone());
        Ok(profile)
    }

    async fn delete_staff_profile(&self, user_id: Uuid) -> Result<bool, StoreError> {
        let mut t = self.lock()?;
        if t.staff.remove(&user_id).is_none() {
            return Ok(false);
        }
        if let Some(user) = t.users.get_mut(&user_id) {
            user.is_staff = user.role == Role::Admin;
            user.updated_utc = Utc::now();
        }
        Ok(true)
    }

    // ==================== Phone numbers ====================

    async fn insert_phone(&self, phone: &PhoneNumber) -> Result<PhoneNumber, StoreError> {
        let mut t = self.lock()?;
        if !t.users.contains_key(&phone.user_id) {
            return Err(StoreError::NotFound);
        }
        let has_any = t.phones.values().any(|p| p.user_id == phone.user_id);
        let mut stored = phone.clone();
        stored.is_primary = phone.is_primary || !has_any;
        if stored.is_primary {
            t.clear_primary(phone.user_id, stored.updated_utc);
        }
        t.phones.insert(stored.phone_id, stored.clone());
        Ok(stored)
    }

    async fn list_phones(&self, user_id: Uuid) -> Result<Vec<PhoneNumber>, StoreError> {
        let t = self.lock()?;
        let mut phones: Vec<PhoneNumber> = t
            .phones
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        phones.sort_by(|a, b| {
            b.is_primary
                .cmp(&a.is_primary)
                .then(a.created_utc.cmp(&b.created_utc))
        });
        Ok(phones)
    }

    async fn set_primary_phone(
        &self,
        user_id: Uuid,
        phone_id: Uuid,
    ) -> Result<PhoneNumber, StoreError> {
        let mut t = self.lock()?;
        match t.phones.get(&phone_id) {
            Some(p) if p.user_id == user_id => {}
            _ => return Err(StoreError::NotFound),
        }
        let now = Utc::now();
        t.clear_primary(user_id, now);
        let phone = t.phones.get_mut(&phone_id).ok_or(StoreError::NotFound)?;
        phone.is_primary = true;
        phone.updated_utc = now;
        Ok(phone.clone())
    }

    async fn delete_phone(&self, user_id: Uuid, phone_id: Uuid) -> Result<bool, StoreError> {
        let mut t = self.lock()?;
        match t.phones.get(&phone_id) {
            Some(p) if p.user_id == user_id => {
                t.phones.remove(&phone_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    // ==================== Tokens ====================

    async fn replace_token(&self, token: &VerificationToken) -> Result<(), StoreError> {
        let mut t = self.lock()?;
        t.tokens
            .retain(|_, v| !(v.user_id == token.user_id && v.token_kind == token.token_kind));
        if t.tokens.contains_key(&token.token_hash) {
            return Err(StoreError::unique("verification_tokens_hash_key"));
        }
        t.tokens.insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_token(
        &self,
        token_hash: &str,
        kind: TokenKind,
    ) -> Result<Option<VerificationToken>, StoreError> {
        Ok(self
            .lock()?
            .tokens
            .get(token_hash)
            .filter(|t| t.token_kind == kind)
            .cloned())
    }

    async fn consume_token(
        &self,
        token_hash: &str,
        effect: &TokenEffect,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, StoreError> {
        let mut t = self.lock()?;
        let token = match t.tokens.get(token_hash) {
            Some(token) if token.token_kind == effect.kind() => token.clone(),
            _ => return Ok(ConsumeOutcome::Invalid),
        };
        if token.is_expired_at(now) {
            return Ok(ConsumeOutcome::Expired);
        }

        let user = t
            .users
            .get_mut(&token.user_id)
            .ok_or(StoreError::NotFound)?;
        user.updated_utc = now;
        let revoked_sessions = match effect {
            TokenEffect::MarkEmailVerified => {
                user.email_verified = true;
                Vec::new()
            }
            TokenEffect::SetPasswordHash(hash) => {
                user.password_hash = hash.clone();
                t.revoke_sessions_of(token.user_id, now)
            }
        };
        t.tokens.remove(token_hash);

        Ok(ConsumeOutcome::Consumed {
            user_id: token.user_id,
            revoked_sessions,
        })
    }

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &RefreshSession) -> Result<(), StoreError> {
        let mut t = self.lock()?;
        if t.sessions.contains_key(&session.session_id) {
            return Err(StoreError::unique("refresh_sessions_pkey"));
        }
        t.sessions.insert(session.session_id, session.clone());
        Ok(())
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<RefreshSession>, StoreError> {
        Ok(self.lock()?.sessions.get(&session_id).cloned())
    }

    async fn list_live_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshSession>, StoreError> {
        let t = self.lock()?;
        let mut sessions: Vec<RefreshSession> = t
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.revoked_utc.is_none() && s.expiry_utc > now)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(sessions)
    }

    async fn rotate_session_token(
        &self,
        session_id: Uuid,
        expected_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut t = self.lock()?;
        match t.sessions.get_mut(&session_id) {
            Some(s)
                if s.token_hash_text == expected_hash
                    && s.revoked_utc.is_none()
                    && s.expiry_utc > now =>
            {
                s.token_hash_text = new_hash.to_string();
                s.last_used_utc = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut t = self.lock()?;
        match t.sessions.get_mut(&session_id) {
            Some(s) if s.revoked_utc.is_none() => {
                s.revoked_utc = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError> {
        Ok(self.lock()?.revoke_sessions_of(user_id, now))
    }

    // ==================== Audit ====================

    async fn append_audit_event(&self, event: &AuditEvent) -> Result<(), StoreError> {
        self.lock()?.audit.push(event.clone());
        Ok(())
    }

    async fn list_audit_events(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>, StoreError> {
        let t = self.lock()?;
        let limit = usize::try_from(query.limit.max(0)).unwrap_or(usize::MAX);
        let offset = usize::try_from(query.offset.max(0)).unwrap_or(0);
        // Appended in order, so newest first is a reverse scan.
        Ok(t
            .audit
            .iter()
            .rev()
            .filter(|e| query.actor_user_id.map_or(true, |a| e.actor_user_id == Some(a)))
            .filter(|e| {
                query
                    .action_code
                    .as_deref()
                    .map_or(true, |c| e.action_code == c)
            })
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::models::PhoneKind;

    fn user(email: &str, role: Role) -> User {
        User::new(email, "hash".to_string(), "Jane".to_string(), "Doe".to_string(), role)
    }

    #[tokio::test]
    async fn test_duplicate_email_reports_constraint() {
        let store = InMemoryStore::new();
        store.create_account(&user("a@example.com", Role::Patient), None).await.unwrap();

        let err = store
            .create_account(&user("a@example.com", Role::Doctor), None)
            .await
            .unwrap_err();
        assert!(err.is_unique_violation_of(EMAIL_UNIQUE));
    }

    #[tokio::test]
    async fn test_create_account_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let first = user("first@example.com", Role::Doctor);
        let profile = RoleProfile::Doctor(DoctorProfile::new(
            first.user_id,
            Some("MD-1".to_string()),
            None,
        ));
        store.create_account(&first, Some(&profile)).await.unwrap();

        let second = user("second@example.com", Role::Doctor);
        let clash = RoleProfile::Doctor(DoctorProfile::new(
            second.user_id,
            Some("MD-1".to_string()),
            None,
        ));
        let err = store.create_account(&second, Some(&clash)).await.unwrap_err();
        assert!(err.is_unique_violation_of(LICENSE_UNIQUE));
        assert!(store.find_user_by_email("second@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_first_phone_becomes_primary_and_exclusive() {
        let store = InMemoryStore::new();
        let u = user("p@example.com", Role::Patient);
        store.create_account(&u, None).await.unwrap();

        let first = store
            .insert_phone(&PhoneNumber::new(u.user_id, "5551234567", PhoneKind::Mobile, false))
            .await
            .unwrap();
        assert!(first.is_primary);

        let second = store
            .insert_phone(&PhoneNumber::new(u.user_id, "5557654321", PhoneKind::Home, true))
            .await
            .unwrap();
        assert!(second.is_primary);

        let phones = store.list_phones(u.user_id).await.unwrap();
        assert_eq!(phones.iter().filter(|p| p.is_primary).count(), 1);
        assert_eq!(phones[0].phone_id, second.phone_id);
    }

    #[tokio::test]
    async fn test_consume_expired_token_changes_nothing() {
        let store = InMemoryStore::new();
        let u = user("t@example.com", Role::Patient);
        store.create_account(&u, None).await.unwrap();
        let token = VerificationToken::new(
            u.user_id,
            "digest".to_string(),
            TokenKind::EmailVerification,
            Duration::hours(1),
        );
        store.replace_token(&token).await.unwrap();

        let late = token.expiry_utc;
        let outcome = store
            .consume_token("digest", &TokenEffect::MarkEmailVerified, late)
            .await
            .unwrap();
        assert_eq!(outcome, ConsumeOutcome::Expired);
        let stored = store.find_user_by_id(u.user_id).await.unwrap().unwrap();
        assert!(!stored.email_verified);
    }

    #[tokio::test]
    async fn test_token_of_other_kind_is_invalid() {
        let store = InMemoryStore::new();
        let u = user("k@example.com", Role::Patient);
        store.create_account(&u, None).await.unwrap();
        let token = VerificationToken::new(
            u.user_id,
            "digest".to_string(),
            TokenKind::EmailVerification,
            Duration::hours(1),
        );
        store.replace_token(&token).await.unwrap();

        let outcome = store
            .consume_token(
                "digest",
                &TokenEffect::SetPasswordHash("new".to_string()),
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, ConsumeOutcome::Invalid);
    }

    #[tokio::test]
    async fn test_rotate_is_compare_and_set() {
        let store = InMemoryStore::new();
        let u = user("s@example.com", Role::Patient);
        store.create_account(&u, None).await.unwrap();
        let mut session = RefreshSession::new(u.user_id, Duration::days(1));
        session.token_hash_text = "h1".to_string();
        store.insert_session(&session).await.unwrap();

        let now = Utc::now();
        assert!(store.rotate_session_token(session.session_id, "h1", "h2", now).await.unwrap());
        assert!(!store.rotate_session_token(session.session_id, "h1", "h3", now).await.unwrap());

        assert!(store.revoke_session(session.session_id, now).await.unwrap());
        assert!(!store.revoke_session(session.session_id, now).await.unwrap());
        assert!(!store.rotate_session_token(session.session_id, "h2", "h4", now).await.unwrap());
    }

    #[tokio::test]
    async fn test_audit_listing_is_newest_first_and_filtered() {
        let store = InMemoryStore::new();
        let actor = Uuid::new_v4();
        for action in [
            crate::models::AuditAction::Login,
            crate::models::AuditAction::Logout,
            crate::models::AuditAction::Login,
        ] {
            store
                .append_audit_event(&AuditEvent::new(Some(actor), action, serde_json::json!({})))
                .await
                .unwrap();
        }

        let query = AuditQuery {
            actor_user_id: Some(actor),
            action_code: Some("login".to_string()),
            limit: 10,
            offset: 0,
        };
        let events = store.list_audit_events(&query).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].created_utc >= events[1].created_utc);
    }
}
