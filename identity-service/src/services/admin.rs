use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use super::auth::{account_conflict, PASSWORD_MISMATCH};
use super::permissions::{capabilities_for, has_capability};
use super::policy::PasswordContext;
use super::store::{IdentityStore, LICENSE_UNIQUE};
use super::{AuditRecorder, PolicyService, ProfileRegistry, ServiceError};
use crate::dtos::{
    AssignRoleRequest, AuditEventListResponse, AuditEventsQuery, CapabilitiesResponse,
    CreateAdminUserRequest,
};
use crate::models::{
    normalize_email, AuditAction, Capability, DoctorProfile, PatientProfile, Role, RoleProfile,
    User, UserResponse,
};
use crate::utils::password::hash_password_blocking;
use crate::utils::{FieldErrors, Password, ValidationPipeline};

const DEFAULT_PAGE_SIZE: i64 = 50;

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn IdentityStore>,
    profiles: ProfileRegistry,
    policy: PolicyService,
    audit: AuditRecorder,
}

impl AdminService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        profiles: ProfileRegistry,
        policy: PolicyService,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            store,
            profiles,
            policy,
            audit,
        }
    }

    async fn find_user(&self, user_id: Uuid) -> Result<User, ServiceError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found.".to_string()))
    }

    /// Build a verified superuser in the admin role.
    async fn new_superuser(
        &self,
        email: &str,
        password: String,
        first_name: &str,
        last_name: &str,
    ) -> Result<User, ServiceError> {
        let password_hash = hash_password_blocking(Password::new(password)).await?;
        let mut user = User::new(
            email,
            password_hash.into_string(),
            first_name.trim().to_string(),
            last_name.trim().to_string(),
            Role::Admin,
        );
        user.is_staff = true;
        user.is_superuser = true;
        user.email_verified = true;
        Ok(user)
    }

    /// Only a superuser holding `manage_users` may create another admin.
    pub async fn create_admin_user(
        &self,
        actor: &User,
        req: CreateAdminUserRequest,
    ) -> Result<UserResponse, ServiceError> {
        if !actor.is_superuser || !has_capability(actor, None, Capability::ManageUsers) {
            tracing::warn!(actor_user_id = %actor.user_id, "Admin creation refused");
            return Err(ServiceError::Forbidden(
                "Only superusers can create admin users.".to_string(),
            ));
        }

        let email = normalize_email(&req.email);
        ValidationPipeline::of(&req)
            .check(|r, errs| {
                if r.password != r.password_confirm {
                    errs.add("password_confirm", PASSWORD_MISMATCH);
                }
                let ctx = PasswordContext {
                    email: &email,
                    first_name: r.first_name.trim(),
                    last_name: r.last_name.trim(),
                };
                self.policy.validate_into("password", &r.password, &ctx, errs);
            })
            .finish()?;

        let user = self
            .new_superuser(&email, req.password, &req.first_name, &req.last_name)
            .await?;
        self.store
            .create_account(&user, None)
            .await
            .map_err(account_conflict)?;

        tracing::info!(
            actor_user_id = %actor.user_id,
            user_id = %user.user_id,
            "Admin user created"
        );
        self.audit.record(
            Some(actor.user_id),
            AuditAction::AdminUserCreated,
            json!({ "user_id": user.user_id, "email": user.email }),
        );
        Ok(user.sanitized())
    }

    /// Change a user's role, creating the new role's profile if missing.
    pub async fn assign_role(
        &self,
        actor: &User,
        user_id: Uuid,
        req: AssignRoleRequest,
    ) -> Result<UserResponse, ServiceError> {
        ValidationPipeline::of(&req).finish()?;
        let role: Role = req
            .role
            .parse()
            .map_err(|_| ServiceError::field("role", format!("\"{}\" is not a valid choice.", req.role)))?;

        let target = self.find_user(user_id).await?;
        let profile = match role {
            Role::Patient => Some(RoleProfile::Patient(PatientProfile::new(target.user_id))),
            Role::Doctor => Some(RoleProfile::Doctor(DoctorProfile::new(
                target.user_id,
                req.license_number
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty()),
                req.specialty
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
            ))),
            Role::Staff | Role::Admin => None,
        };

        let updated = self
            .store
            .assign_role(target.user_id, role, profile.as_ref())
            .await
            .map_err(|e| {
                if e.is_unique_violation_of(LICENSE_UNIQUE) {
                    ServiceError::field("license_number", super::auth::LICENSE_TAKEN)
                } else {
                    e.into()
                }
            })?;

        tracing::info!(
            actor_user_id = %actor.user_id,
            user_id = %updated.user_id,
            from = %target.role,
            to = %role,
            "Role assigned"
        );
        self.audit.record(
            Some(actor.user_id),
            AuditAction::RoleAssigned,
            json!({
                "user_id": updated.user_id,
                "from": target.role.as_str(),
                "to": role.as_str(),
            }),
        );
        Ok(updated.sanitized())
    }

    pub async fn user_capabilities(&self, user_id: Uuid) -> Result<CapabilitiesResponse, ServiceError> {
        let user = self.find_user(user_id).await?;
        let staff_role = self.profiles.get_staff_role(user.user_id).await?;

        Ok(CapabilitiesResponse {
            user_id: user.user_id,
            role: user.role,
            staff_role,
            capabilities: capabilities_for(&user, staff_role).into_iter().collect(),
        })
    }

    pub async fn list_audit_events(
        &self,
        query: AuditEventsQuery,
    ) -> Result<AuditEventListResponse, ServiceError> {
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = query.offset.unwrap_or(0);

        let events = self
            .audit
            .list_events(query.actor_user_id, query.action, limit, offset)
            .await?;

        Ok(AuditEventListResponse {
            events: events.into_iter().map(Into::into).collect(),
            limit: limit.clamp(1, super::audit::MAX_PAGE_SIZE),
            offset: offset.max(0),
        })
    }

    /// Create the configured superuser unless the email is already taken.
    /// Returns whether an account was created.
    pub async fn ensure_bootstrap_superuser(
        &self,
        email: &str,
        password: &str,
    ) -> Result<bool, ServiceError> {
        let email = normalize_email(email);

        if let Some(existing) = self.store.find_user_by_email(&email).await? {
            if !existing.is_superuser {
                tracing::warn!(
                    user_id = %existing.user_id,
                    "Bootstrap admin email belongs to a non-superuser account; leaving it unchanged"
                );
            }
            return Ok(false);
        }

        let mut errors = FieldErrors::new();
        let ctx = PasswordContext {
            email: &email,
            ..Default::default()
        };
        self.policy
            .validate_into("BOOTSTRAP_ADMIN_PASSWORD", password, &ctx, &mut errors);
        errors.into_result()?;

        let user = self
            .new_superuser(&email, password.to_string(), "Admin", "")
            .await?;
        match self.store.create_account(&user, None).await {
            Ok(()) => {}
            // Another instance won the race.
            Err(e) if e.is_unique_violation_of(super::store::EMAIL_UNIQUE) => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(user_id = %user.user_id, "Bootstrap superuser created");
        self.audit.record(
            None,
            AuditAction::AdminUserCreated,
            json!({ "user_id": user.user_id, "email": user.email, "bootstrap": true }),
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StaffRole;
    use crate::services::InMemoryStore;

    fn service() -> (AdminService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let audit = AuditRecorder::new(store.clone());
        let profiles = ProfileRegistry::new(store.clone(), audit.clone());
        (
            AdminService::new(store.clone(), profiles, PolicyService::default(), audit),
            store,
        )
    }

    fn admin_request(email: &str) -> CreateAdminUserRequest {
        CreateAdminUserRequest {
            email: email.to_string(),
            password: "Quiet-Harbor-42".to_string(),
            password_confirm: "Quiet-Harbor-42".to_string(),
            first_name: "Olu".to_string(),
            last_name: "Bello".to_string(),
        }
    }

    async fn bootstrap(svc: &AdminService, store: &InMemoryStore) -> User {
        assert!(svc
            .ensure_bootstrap_superuser("root@example.com", "Quiet-Harbor-42")
            .await
            .unwrap());
        store
            .find_user_by_email("root@example.com")
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let (svc, store) = service();
        let root = bootstrap(&svc, &store).await;
        assert!(root.is_superuser && root.is_staff && root.email_verified);
        assert_eq!(root.role, Role::Admin);

        assert!(!svc
            .ensure_bootstrap_superuser("ROOT@example.com", "Quiet-Harbor-42")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_bootstrap_rejects_weak_password() {
        let (svc, _) = service();
        assert!(matches!(
            svc.ensure_bootstrap_superuser("root@example.com", "password").await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_only_superusers_create_admins() {
        let (svc, store) = service();
        let root = bootstrap(&svc, &store).await;

        let created = svc
            .create_admin_user(&root, admin_request("ops@example.com"))
            .await
            .unwrap();
        assert!(created.is_superuser);

        let ops = store.find_user_by_id(created.user_id).await.unwrap().unwrap();
        let mut plain_admin = ops.clone();
        plain_admin.is_superuser = false;
        assert!(matches!(
            svc.create_admin_user(&plain_admin, admin_request("x@example.com"))
                .await,
            Err(ServiceError::Forbidden(_))
        ));

        assert!(matches!(
            svc.create_admin_user(&root, admin_request("ops@example.com"))
                .await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_assign_role_creates_profile() {
        let (svc, store) = service();
        let root = bootstrap(&svc, &store).await;
        let user = User::new(
            "p@example.com",
            "hash".to_string(),
            "Pat".to_string(),
            "Lowe".to_string(),
            Role::Patient,
        );
        store
            .create_account(
                &user,
                Some(&RoleProfile::Patient(PatientProfile::new(user.user_id))),
            )
            .await
            .unwrap();

        let updated = svc
            .assign_role(
                &root,
                user.user_id,
                AssignRoleRequest {
                    role: "doctor".to_string(),
                    license_number: Some("MD-77".to_string()),
                    specialty: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Doctor);
        let doctor = store.find_doctor_profile(user.user_id).await.unwrap().unwrap();
        assert_eq!(doctor.license_number.as_deref(), Some("MD-77"));

        assert!(matches!(
            svc.assign_role(
                &root,
                Uuid::new_v4(),
                AssignRoleRequest {
                    role: "staff".to_string(),
                    license_number: None,
                    specialty: None,
                },
            )
            .await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            svc.assign_role(
                &root,
                user.user_id,
                AssignRoleRequest {
                    role: "wizard".to_string(),
                    license_number: None,
                    specialty: None,
                },
            )
            .await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_capabilities_follow_current_sub_role() {
        let (svc, store) = service();
        let root = bootstrap(&svc, &store).await;
        let staff = User::new(
            "s@example.com",
            "hash".to_string(),
            "Sol".to_string(),
            "Park".to_string(),
            Role::Staff,
        );
        store.create_account(&staff, None).await.unwrap();

        svc.profiles
            .assign_staff_role(&root, staff.user_id, StaffRole::Nurse)
            .await
            .unwrap();
        let caps = svc.user_capabilities(staff.user_id).await.unwrap();
        assert!(caps.capabilities.contains(&Capability::RecordVitals));

        svc.profiles
            .assign_staff_role(&root, staff.user_id, StaffRole::BillingClerk)
            .await
            .unwrap();
        let caps = svc.user_capabilities(staff.user_id).await.unwrap();
        assert_eq!(caps.staff_role, Some(StaffRole::BillingClerk));
        assert!(caps.capabilities.contains(&Capability::ManageBilling));
        assert!(!caps.capabilities.contains(&Capability::RecordVitals));
    }
}
